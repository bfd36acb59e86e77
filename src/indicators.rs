//! Pure indicator transform: candle series in, annotated series out
//!
//! Indicator set mirrors the oracle prompt: Bollinger Bands (20, 2),
//! RSI(14), MACD(12, 26, 9), SMA(20), EMA(12). Bars inside the warm-up
//! prefix are dropped, never null-filled.

use rust_decimal::prelude::ToPrimitive;
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::Next;

use crate::types::{AnnotatedCandle, Candle};

/// Longest lookback across the indicator set: MACD slow (26) plus its
/// signal line (9), minus the shared seed bar.
pub const WARMUP_BARS: usize = 33;

/// Annotate an oldest-first candle series. Returns an empty vec when the
/// input is too short to produce any fully warmed-up bar.
pub fn annotate(candles: &[Candle]) -> Vec<AnnotatedCandle> {
    if candles.len() <= WARMUP_BARS {
        return Vec::new();
    }

    let mut sma = SimpleMovingAverage::new(20).unwrap();
    let mut ema = ExponentialMovingAverage::new(12).unwrap();
    let mut rsi = RelativeStrengthIndex::new(14).unwrap();
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).unwrap();
    let mut bbands = BollingerBands::new(20, 2.0).unwrap();

    let mut out = Vec::with_capacity(candles.len() - WARMUP_BARS);
    for (i, candle) in candles.iter().enumerate() {
        let close = candle.close.to_f64().unwrap_or(0.0);

        let sma_20 = sma.next(close);
        let ema_12 = ema.next(close);
        let rsi_14 = rsi.next(close);
        let macd_out = macd.next(close);
        let bb = bbands.next(close);

        if i < WARMUP_BARS {
            continue;
        }

        out.push(AnnotatedCandle {
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            sma_20,
            ema_12,
            rsi_14,
            macd: macd_out.macd,
            macd_signal: macd_out.signal,
            macd_diff: macd_out.histogram,
            bb_upper: bb.upper,
            bb_middle: bb.average,
            bb_lower: bb.lower,
        });
    }
    out
}
