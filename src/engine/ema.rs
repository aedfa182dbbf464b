//! # engine::ema
//!
//! Exponential moving averages over a daily closing-price series.
//!
//! ```text
//! E[w-1] = mean(P[0..w])              seed
//! E[i]   = P[i]·k + E[i-1]·(1-k)      i ≥ w,  k = 2 / (w + 1)
//! ```
//!
//! Positions before the seed are `None`.  They must never be published as
//! zero, so [`line`] drops them when building a plottable series.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::PriceBar;

/// Computes the EMA of `closes` for `window`, aligned index-for-index.
///
/// Returns all-`None` when `closes.len() < window` or `window == 0`.
pub fn ema(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window == 0 || closes.len() < window {
        return out;
    }

    let k = 2.0 / (window as f64 + 1.0);
    let seed = closes[..window].iter().sum::<f64>() / window as f64;
    out[window - 1] = Some(seed);

    let mut prev = seed;
    for (i, &price) in closes.iter().enumerate().skip(window) {
        prev = price * k + prev * (1.0 - k);
        out[i] = Some(prev);
    }
    out
}

// ─── Bar Series ───────────────────────────────────────────────────────────────

/// The two windows the chart draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmaWindows {
    pub fast: usize,
    pub slow: usize,
}

impl Default for EmaWindows {
    fn default() -> Self {
        Self { fast: 21, slow: 200 }
    }
}

/// Writes client-side EMAs onto `bars`, replacing whatever the API sent.
///
/// Bars before a window has seeded end up with `None` for that window.
pub fn attach_emas(bars: &mut [PriceBar], windows: EmaWindows) {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let fast = ema(&closes, windows.fast);
    let slow = ema(&closes, windows.slow);

    for ((bar, fast), slow) in bars.iter_mut().zip(fast).zip(slow) {
        bar.ema_fast = fast;
        bar.ema_slow = slow;
    }
}

/// Recomputes only the last bar's EMAs after its close moved or it was
/// appended.  Everything before it is assumed to be current.
pub fn refresh_last(bars: &mut [PriceBar], windows: EmaWindows) {
    let n = bars.len();
    if n == 0 {
        return;
    }
    let fast = last_value(bars, windows.fast, |b| b.ema_fast);
    let slow = last_value(bars, windows.slow, |b| b.ema_slow);
    let last = &mut bars[n - 1];
    last.ema_fast = fast;
    last.ema_slow = slow;
}

fn last_value(bars: &[PriceBar], window: usize, pick: impl Fn(&PriceBar) -> Option<f64>) -> Option<f64> {
    let n = bars.len();
    if window == 0 || n < window {
        return None;
    }
    if n == window {
        return Some(bars.iter().map(|b| b.close).sum::<f64>() / window as f64);
    }
    let k = 2.0 / (window as f64 + 1.0);
    pick(&bars[n - 2]).map(|prev| bars[n - 1].close * k + prev * (1.0 - k))
}

/// One plottable EMA value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmaPoint {
    pub date:  NaiveDate,
    pub value: f64,
}

/// Pairs each defined EMA value with its bar's date, skipping unseeded bars.
pub fn line(bars: &[PriceBar], pick: impl Fn(&PriceBar) -> Option<f64>) -> Vec<EmaPoint> {
    bars.iter()
        .filter_map(|bar| pick(bar).map(|value| EmaPoint { date: bar.date, value }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(values: &[Option<f64>]) -> Vec<(usize, f64)> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_worked_example_window_three() {
        let out = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(defined(&out), vec![(2, 2.0), (3, 3.0), (4, 4.0)]);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_short_series_never_seeds() {
        let out = ema(&[10.0, 11.0, 12.0], 21);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(Option::is_none));
        assert!(ema(&[], 3).is_empty());
    }

    #[test]
    fn test_defined_count_and_seed() {
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0).collect();
        for w in [1, 21, 200, 250] {
            let out = ema(&closes, w);
            let def = defined(&out);
            assert_eq!(def.len(), closes.len() - w + 1, "window {w}");

            let mean = closes[..w].iter().sum::<f64>() / w as f64;
            assert_eq!(def[0].0, w - 1);
            assert!(approx(def[0].1, mean));
        }
    }

    #[test]
    fn test_constant_input_is_flat() {
        let closes = vec![42.5; 30];
        for v in ema(&closes, 21).into_iter().flatten() {
            assert!(approx(v, 42.5));
        }
    }

    #[test]
    fn test_zero_window_is_empty_not_panic() {
        assert!(ema(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn test_attach_discards_server_values_before_seed() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut bars: Vec<PriceBar> = (0..5)
            .map(|i| PriceBar {
                ema_fast: Some(100.0),
                ema_slow: Some(100.0),
                ..PriceBar::flat(start + chrono::Days::new(i), (i + 1) as f64)
            })
            .collect();

        attach_emas(&mut bars, EmaWindows { fast: 3, slow: 200 });

        let fast = line(&bars, |b| b.ema_fast);
        assert_eq!(fast.len(), bars.len() - 3 + 1);
        let values: Vec<f64> = fast.iter().map(|p| p.value).collect();
        assert_eq!(values, [2.0, 3.0, 4.0]);
        assert!(line(&bars, |b| b.ema_slow).is_empty());
    }

    #[test]
    fn test_refresh_last_matches_full_recompute() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut bars: Vec<PriceBar> = (0..8)
            .map(|i| PriceBar::flat(start + chrono::Days::new(i), 10.0 + (i as f64 * 1.3).cos()))
            .collect();
        let windows = EmaWindows { fast: 3, slow: 8 };
        attach_emas(&mut bars, windows);

        // the live close moves
        bars[7].close = 14.0;
        refresh_last(&mut bars, windows);
        let mut expected = bars.clone();
        attach_emas(&mut expected, windows);
        assert!(approx(bars[7].ema_fast.unwrap(), expected[7].ema_fast.unwrap()));
        assert!(approx(bars[7].ema_slow.unwrap(), expected[7].ema_slow.unwrap()));

        // a new bar is appended
        bars.push(PriceBar::flat(start + chrono::Days::new(8), 9.0));
        refresh_last(&mut bars, windows);
        let mut expected = bars.clone();
        attach_emas(&mut expected, windows);
        assert!(approx(bars[8].ema_fast.unwrap(), expected[8].ema_fast.unwrap()));
        assert!(approx(bars[8].ema_slow.unwrap(), expected[8].ema_slow.unwrap()));
    }

    #[test]
    fn test_refresh_last_on_short_series() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut bars = vec![PriceBar::flat(start, 50.0)];
        refresh_last(&mut bars, EmaWindows { fast: 1, slow: 2 });
        assert_eq!(bars[0].ema_fast, Some(50.0));
        assert_eq!(bars[0].ema_slow, None);

        refresh_last(&mut [], EmaWindows::default());
    }

    #[test]
    fn test_line_skips_unseeded_and_keeps_dates() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut bars: Vec<PriceBar> = (0..5)
            .map(|i| PriceBar::flat(start + chrono::Days::new(i), (i + 1) as f64))
            .collect();
        attach_emas(&mut bars, EmaWindows { fast: 3, slow: 200 });

        let fast = line(&bars, |b| b.ema_fast);
        assert_eq!(fast.len(), 3);
        assert_eq!(fast[0].date, bars[2].date);
        assert_eq!(fast[2], EmaPoint { date: bars[4].date, value: 4.0 });

        assert!(line(&bars, |b| b.ema_slow).is_empty());
    }
}
