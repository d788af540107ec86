//! Indicator Algebra
//!
//! Windowed operators over a single, chronologically ordered series. A value is
//! `None` wherever the trailing window is incomplete or touches an undefined
//! input, so callers never confuse "not enough history" with a real number.
//! Comparisons treat `None` as false.

/// Lift a raw series into the optional domain, mapping non-finite values to `None`.
pub fn defined(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| v.is_finite().then_some(*v))
        .collect()
}

/// Value `n` observations back (`REF`). The first `n` entries are undefined.
pub fn shift(series: &[Option<f64>], n: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| if i >= n { series[i - n] } else { None })
        .collect()
}

/// Apply `f` to every complete trailing window of length `n`.
fn rolling<F>(series: &[Option<f64>], n: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![None; series.len()];
    if n == 0 {
        return out;
    }
    let mut buf = Vec::with_capacity(n);
    for end in (n - 1)..series.len() {
        buf.clear();
        for value in &series[end + 1 - n..=end] {
            match value {
                Some(v) => buf.push(*v),
                None => break,
            }
        }
        if buf.len() == n {
            out[end] = Some(f(&buf));
        }
    }
    out
}

/// Rolling maximum over the trailing `n` observations (`HHV`).
pub fn hhv(series: &[Option<f64>], n: usize) -> Vec<Option<f64>> {
    rolling(series, n, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Rolling minimum over the trailing `n` observations (`LLV`).
pub fn llv(series: &[Option<f64>], n: usize) -> Vec<Option<f64>> {
    rolling(series, n, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Simple moving average over the trailing `n` observations (`MA`).
pub fn ma(series: &[Option<f64>], n: usize) -> Vec<Option<f64>> {
    rolling(series, n, |w| w.iter().sum::<f64>() / w.len() as f64)
}

fn compare<F>(a: &[Option<f64>], b: &[Option<f64>], op: F) -> Vec<bool>
where
    F: Fn(f64, f64) -> bool,
{
    a.iter()
        .zip(b)
        .map(|(x, y)| matches!((x, y), (Some(x), Some(y)) if op(*x, *y)))
        .collect()
}

/// Element-wise `a > b`.
pub fn gt(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<bool> {
    compare(a, b, |x, y| x > y)
}

/// Element-wise `a >= b`.
pub fn ge(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<bool> {
    compare(a, b, |x, y| x >= y)
}

/// Element-wise `a == b`.
pub fn eq(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<bool> {
    compare(a, b, |x, y| x == y)
}

/// Number of `true` flags in the trailing `n` observations (`COUNT`).
pub fn count(flags: &[bool], n: usize) -> Vec<Option<usize>> {
    let mut out = vec![None; flags.len()];
    if n == 0 {
        return out;
    }
    let mut running = 0usize;
    for (i, flag) in flags.iter().enumerate() {
        running += usize::from(*flag);
        if i >= n {
            running -= usize::from(flags[i - n]);
        }
        if i + 1 >= n {
            out[i] = Some(running);
        }
    }
    out
}

/// Whether all of the trailing `n` flags are `true` (`EVERY`).
///
/// Incomplete windows are false.
pub fn every(flags: &[bool], n: usize) -> Vec<bool> {
    count(flags, n)
        .into_iter()
        .map(|c| c == Some(n))
        .collect()
}

/// Last element of a computed series, flattened.
pub fn last<T: Copy>(series: &[Option<T>]) -> Option<T> {
    series.last().copied().flatten()
}

/// `numerator / denominator`, undefined when the denominator is zero or either
/// side is undefined.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Fractional decline from the highest high of the trailing `window`
/// observations to the lowest low at or after that high.
///
/// Returns 0 when the peak is the last observation or the peak high is 0,
/// and 1 when there are no observations at all (so every "drawdown at most x"
/// check fails). The first occurrence of the maximum is the peak.
pub fn drawdown_since_peak(high: &[f64], low: &[f64], window: usize) -> f64 {
    let len = high.len().min(low.len());
    let start = len.saturating_sub(window);
    let high = &high[start..len];
    let low = &low[start..len];

    if high.is_empty() {
        return 1.0;
    }

    let mut peak = 0;
    for (i, value) in high.iter().enumerate() {
        if *value > high[peak] {
            peak = i;
        }
    }
    let peak_high = high[peak];

    if peak_high == 0.0 || peak == high.len() - 1 {
        return 0.0;
    }

    let trough = low[peak..].iter().copied().fold(f64::INFINITY, f64::min);
    (peak_high - trough) / peak_high
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn s(values: &[f64]) -> Vec<Option<f64>> {
        defined(values)
    }

    #[test]
    fn test_shift() {
        let shifted = shift(&s(&[1.0, 2.0, 3.0]), 1);
        assert_eq!(shifted, vec![None, Some(1.0), Some(2.0)]);
        assert_eq!(shift(&s(&[1.0, 2.0]), 5), vec![None, None]);
    }

    #[test]
    fn test_hhv_llv_include_current() {
        let series = s(&[3.0, 1.0, 4.0, 1.0, 5.0]);
        assert_eq!(
            hhv(&series, 3),
            vec![None, None, Some(4.0), Some(4.0), Some(5.0)]
        );
        assert_eq!(
            llv(&series, 3),
            vec![None, None, Some(1.0), Some(1.0), Some(1.0)]
        );
    }

    #[test]
    fn test_ma() {
        let averages = ma(&s(&[1.0, 2.0, 3.0, 4.0]), 2);
        assert_eq!(averages[0], None);
        assert_relative_eq!(averages[1].unwrap(), 1.5);
        assert_relative_eq!(averages[3].unwrap(), 3.5);
    }

    #[test]
    fn test_window_with_gap_is_undefined() {
        let series = vec![Some(1.0), None, Some(3.0), Some(4.0)];
        let averages = ma(&series, 2);
        assert_eq!(averages[1], None);
        assert_eq!(averages[2], None);
        assert_eq!(averages[3], Some(3.5));
    }

    #[test]
    fn test_zero_window_is_undefined() {
        assert!(ma(&s(&[1.0, 2.0]), 0).iter().all(Option::is_none));
        assert!(count(&[true, true], 0).iter().all(Option::is_none));
    }

    #[test]
    fn test_comparisons_treat_undefined_as_false() {
        let a = vec![Some(2.0), None, Some(1.0)];
        let b = vec![Some(1.0), Some(0.0), None];
        assert_eq!(gt(&a, &b), vec![true, false, false]);
        assert_eq!(ge(&a, &a), vec![true, false, true]);
        assert_eq!(eq(&a, &a), vec![true, false, true]);
    }

    #[test]
    fn test_count_and_every() {
        let flags = [true, false, true, true, true];
        assert_eq!(
            count(&flags, 3),
            vec![None, None, Some(2), Some(2), Some(3)]
        );
        assert_eq!(every(&flags, 3), vec![false, false, false, false, true]);
    }

    #[test]
    fn test_every_short_window_is_false() {
        assert_eq!(every(&[true, true], 30), vec![false, false]);
    }

    #[test]
    fn test_ratio_guards_zero() {
        assert_eq!(ratio(Some(1.0), Some(0.0)), None);
        assert_eq!(ratio(None, Some(2.0)), None);
        assert_eq!(ratio(Some(1.0), Some(2.0)), Some(0.5));
    }

    #[rstest]
    #[case::peak_is_last(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], 3, 0.0)]
    #[case::zero_peak(&[0.0, 0.0], &[0.0, 0.0], 2, 0.0)]
    #[case::empty(&[], &[], 120, 1.0)]
    #[case::half(&[10.0, 8.0, 9.0], &[9.0, 5.0, 7.0], 3, 0.5)]
    #[case::window_drops_old_peak(&[20.0, 10.0, 8.0, 9.0], &[1.0, 9.0, 5.0, 7.0], 3, 0.5)]
    #[case::low_on_peak_day_counts(&[10.0, 9.0], &[6.0, 8.0], 2, 0.4)]
    fn test_drawdown_since_peak(
        #[case] high: &[f64],
        #[case] low: &[f64],
        #[case] window: usize,
        #[case] expected: f64,
    ) {
        assert_relative_eq!(drawdown_since_peak(high, low, window), expected);
    }

    #[test]
    fn test_drawdown_first_peak_wins() {
        // Equal highs: the earlier one is the peak, so the later low counts.
        let dd = drawdown_since_peak(&[10.0, 10.0, 9.0], &[10.0, 9.0, 8.0], 3);
        assert_relative_eq!(dd, 0.2);
    }

    #[test]
    fn test_last() {
        assert_eq!(last(&[Some(1.0), None]), None);
        assert_eq!(last(&[None, Some(2usize)]), Some(2));
        assert_eq!(last::<f64>(&[]), None);
    }
}
