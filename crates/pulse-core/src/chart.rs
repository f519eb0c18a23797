//! Deterministic ASCII line charts.
//!
//! [`plot`] maps one or more numeric series onto a character grid with a
//! labelled vertical axis. The same input and configuration always produce the
//! same bytes. Non-finite values never panic: NaN gaps leave dangling markers
//! and infinities are clamped to the plotted range.

use crate::error::{Result, TelemetryError};

/// Tallest grid [`plot`] will allocate.
pub const MAX_ROWS: usize = 10_000;

/// Glyphs used to draw the axis and the lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbols {
    /// Axis mark on the zero row and at the first value.
    pub axis_zero: char,
    pub axis: char,
    /// A value following a gap.
    pub gap_end: char,
    /// A value followed by a gap.
    pub gap_start: char,
    pub flat: char,
    pub fall_bottom: char,
    pub rise_top: char,
    pub fall_top: char,
    pub rise_bottom: char,
    pub vertical: char,
}

impl Default for Symbols {
    fn default() -> Self {
        Self {
            axis_zero: '┼',
            axis: '┤',
            gap_end: '╶',
            gap_start: '╴',
            flat: '─',
            fall_bottom: '╰',
            rise_top: '╭',
            fall_top: '╮',
            rise_bottom: '╯',
            vertical: '│',
        }
    }
}

/// Fixed-point format of the axis labels: right-aligned, followed by a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelFormat {
    pub width: usize,
    pub precision: usize,
}

impl Default for LabelFormat {
    fn default() -> Self {
        Self {
            width: 8,
            precision: 2,
        }
    }
}

impl LabelFormat {
    fn render(self, value: f64) -> String {
        format!(
            "{value:>width$.precision$} ",
            width = self.width,
            precision = self.precision
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotConfig {
    /// Bottom of the plotted range. Defaults to `min(0, data_min)`.
    pub min: Option<f64>,
    /// Top of the plotted range. Defaults to `data_max`.
    pub max: Option<f64>,
    /// Rows between min and max. Defaults to the value range itself.
    pub height: Option<usize>,
    /// Columns reserved left of the first data point; the axis sits in the last one.
    pub offset: usize,
    pub symbols: Symbols,
    pub label: LabelFormat,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            height: None,
            offset: 3,
            symbols: Symbols::default(),
            label: LabelFormat::default(),
        }
    }
}

impl PlotConfig {
    pub fn with_height(height: usize) -> Self {
        Self {
            height: Some(height),
            ..Self::default()
        }
    }
}

/// Plots a single series.
///
/// # Errors
/// See [`plot`].
pub fn plot_series(values: &[f64], config: &PlotConfig) -> Result<String> {
    plot(&[values], config)
}

/// Plots every series onto one grid.
///
/// Returns an empty string when there is nothing to plot: no values, or no
/// finite value and no explicit `min`/`max` to anchor the axis.
///
/// # Errors
/// Returns `InvalidConfiguration` when the resolved minimum exceeds the
/// maximum, a bound is not finite, `offset` is zero, or the grid would be
/// taller than [`MAX_ROWS`] (an unset height defaults to the value range).
pub fn plot<S: AsRef<[f64]>>(series: &[S], config: &PlotConfig) -> Result<String> {
    let series: Vec<&[f64]> = series
        .iter()
        .map(AsRef::as_ref)
        .filter(|values| !values.is_empty())
        .collect();
    if series.is_empty() {
        return Ok(String::new());
    }
    if config.offset == 0 {
        return Err(TelemetryError::InvalidConfiguration(
            "offset must leave room for the axis".to_string(),
        ));
    }

    let (data_min, data_max) = finite_bounds(&series);
    let minimum = match (config.min, data_min) {
        (Some(min), _) => min,
        (None, Some(data_min)) => data_min.min(0.0),
        (None, None) => return Ok(String::new()),
    };
    let maximum = match (config.max, data_max) {
        (Some(max), _) => max,
        (None, Some(data_max)) => data_max,
        (None, None) => return Ok(String::new()),
    };

    if !minimum.is_finite() || !maximum.is_finite() {
        return Err(TelemetryError::InvalidConfiguration(format!(
            "chart bounds must be finite (min {minimum}, max {maximum})"
        )));
    }
    if minimum > maximum {
        return Err(TelemetryError::InvalidConfiguration(format!(
            "the min value ({minimum}) cannot exceed the max value ({maximum})"
        )));
    }

    let interval = maximum - minimum;
    let height = config.height.map_or(interval, |h| h as f64);
    let ratio = if interval > 0.0 { height / interval } else { 1.0 };

    let min2 = (minimum * ratio).floor();
    let max2 = (maximum * ratio).ceil();
    let span = max2 - min2;
    if !span.is_finite() || span > MAX_ROWS as f64 {
        return Err(TelemetryError::InvalidConfiguration(format!(
            "the range {minimum}..{maximum} needs {span} rows, more than {MAX_ROWS}; \
             pass a height"
        )));
    }
    let rows = span as usize;

    let scaled = |value: f64| -> usize {
        let row = (value.clamp(minimum, maximum) * ratio).round_ties_even() - min2;
        (row.max(0.0) as usize).min(rows)
    };

    let offset = config.offset;
    let symbols = config.symbols;
    let width = series.iter().map(|values| values.len()).max().unwrap_or(0) + offset;
    let mut grid = vec![vec![String::from(" "); width]; rows + 1];

    // Axis and labels, top row first.
    let label_step = interval / rows.max(1) as f64;
    let zero_row = (0.0..=rows as f64).contains(&max2).then(|| max2 as usize);
    for (r, row) in grid.iter_mut().enumerate() {
        let label = config.label.render(maximum - r as f64 * label_step);
        let label_col = offset.saturating_sub(label.chars().count());
        row[label_col] = label;
        let axis = if Some(r) == zero_row { symbols.axis_zero } else { symbols.axis };
        row[offset - 1] = String::from(axis);
    }

    let first = series[0][0];
    if first.is_finite() {
        grid[rows - scaled(first)][offset - 1] = String::from(symbols.axis_zero);
    }

    let mut put = |row: usize, col: usize, glyph: char| {
        grid[rows - row][col] = String::from(glyph);
    };

    for values in &series {
        for (x, pair) in values.windows(2).enumerate() {
            let (d0, d1) = (pair[0], pair[1]);
            let col = x + offset;

            if !d0.is_finite() && !d1.is_finite() {
                continue;
            }
            if d0.is_nan() {
                put(scaled(d1), col, symbols.gap_end);
                continue;
            }
            if d1.is_nan() {
                put(scaled(d0), col, symbols.gap_start);
                continue;
            }

            let (y0, y1) = (scaled(d0), scaled(d1));
            if y0 == y1 {
                put(y0, col, symbols.flat);
                continue;
            }

            let falling = y0 > y1;
            put(y1, col, if falling { symbols.fall_bottom } else { symbols.rise_top });
            put(y0, col, if falling { symbols.fall_top } else { symbols.rise_bottom });
            for y in y0.min(y1) + 1..y0.max(y1) {
                put(y, col, symbols.vertical);
            }
        }
    }

    let lines: Vec<String> = grid
        .into_iter()
        .map(|row| row.concat().trim_end().to_string())
        .collect();
    Ok(lines.join("\n"))
}

fn finite_bounds(series: &[&[f64]]) -> (Option<f64>, Option<f64>) {
    series
        .iter()
        .flat_map(|values| values.iter().copied())
        .filter(|value| value.is_finite())
        .fold((None, None), |(min, max): (Option<f64>, Option<f64>), value| {
            (
                Some(min.map_or(value, |m| m.min(value))),
                Some(max.map_or(value, |m| m.max(value))),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corners(text: &str) -> usize {
        text.chars().filter(|c| "╭╮╯╰│".contains(*c)).count()
    }

    #[test]
    fn test_peak_renders_expected_grid() {
        let chart = plot_series(&[1.0, 2.0, 3.0, 2.0, 1.0], &PlotConfig::with_height(4)).unwrap();
        let expected = [
            "    3.00  ┤ ╭╮",
            "    2.25  ┤╭╯╰╮",
            "    1.50  ┤│  │",
            "    0.75  ┼╯  ╰",
            "    0.00  ┼",
        ]
        .join("\n");
        assert_eq!(chart, expected);
    }

    #[test]
    fn test_line_count_is_height_plus_one_and_trimmed() {
        let chart = plot_series(&[1.0, 2.0, 3.0, 2.0, 1.0], &PlotConfig::with_height(4)).unwrap();
        let lines: Vec<&str> = chart.lines().filter(|line| !line.is_empty()).collect();
        assert_eq!(lines.len(), 5);
        for line in lines {
            assert_eq!(line, line.trim_end());
        }
    }

    #[test]
    fn test_empty_inputs_render_nothing() {
        let config = PlotConfig::default();
        assert_eq!(plot_series(&[], &config).unwrap(), "");
        assert_eq!(plot::<Vec<f64>>(&[], &config).unwrap(), "");
        assert_eq!(plot_series(&[f64::NAN, f64::NAN], &config).unwrap(), "");
    }

    #[test]
    fn test_nan_gap_draws_dangling_markers() {
        let chart = plot_series(&[1.0, f64::NAN, 3.0], &PlotConfig::with_height(4)).unwrap();
        assert!(chart.contains('╴'), "missing gap start:\n{chart}");
        assert!(chart.contains('╶'), "missing gap end:\n{chart}");
        assert_eq!(corners(&chart), 0, "gap was bridged:\n{chart}");
    }

    #[test]
    fn test_flat_series_draws_segment() {
        let chart = plot_series(&[2.0, 2.0, 2.0], &PlotConfig::with_height(2)).unwrap();
        assert_eq!(chart.matches('─').count(), 2);
        assert_eq!(corners(&chart), 0);
    }

    #[test]
    fn test_min_above_max_is_configuration_error() {
        let config = PlotConfig {
            min: Some(5.0),
            max: Some(1.0),
            ..PlotConfig::default()
        };
        let err = plot_series(&[1.0, 2.0], &config).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_huge_range_without_height_is_configuration_error() {
        for values in [[0.0, 1e300], [-1e300, 1.0]] {
            let err = plot_series(&values, &PlotConfig::default()).unwrap_err();
            assert!(
                matches!(err, TelemetryError::InvalidConfiguration(_)),
                "{values:?}: {err}"
            );
        }
        let err = plot_series(&[0.0, (MAX_ROWS + 1) as f64], &PlotConfig::default()).unwrap_err();
        assert!(err.to_string().contains("pass a height"));
    }

    #[test]
    fn test_huge_range_with_height_plots() {
        let chart = plot_series(&[-1e300, 0.0, 1e300], &PlotConfig::with_height(4)).unwrap();
        assert_eq!(chart.lines().count(), 5);
    }

    #[test]
    fn test_zero_offset_is_configuration_error() {
        let config = PlotConfig {
            offset: 0,
            ..PlotConfig::with_height(2)
        };
        assert!(plot_series(&[1.0, 2.0], &config).is_err());
    }

    #[test]
    fn test_infinite_values_are_clamped() {
        let chart = plot_series(&[1.0, f64::INFINITY, 2.0], &PlotConfig::with_height(4)).unwrap();
        assert_eq!(chart.lines().count(), 5);
        // The top label comes from the finite maximum, not infinity.
        assert!(chart.lines().next().unwrap().contains("2.00"));
    }

    #[test]
    fn test_explicit_bounds_render_axis_without_data() {
        let config = PlotConfig {
            min: Some(0.0),
            max: Some(1.0),
            height: Some(2),
            ..PlotConfig::default()
        };
        let chart = plot_series(&[f64::NAN], &config).unwrap();
        assert_eq!(chart.lines().count(), 3);
    }

    #[test]
    fn test_multiple_series_share_axis() {
        let a = vec![0.0, 1.0];
        let b = vec![4.0, 4.0];
        let chart = plot(&[a, b], &PlotConfig::with_height(4)).unwrap();
        assert!(chart.lines().next().unwrap().starts_with("    4.00"));
        assert!(chart.contains('─'));
    }

    #[test]
    fn test_output_is_deterministic() {
        let values = [0.3, 1.7, f64::NAN, 2.2, 0.9, 0.9, 4.1];
        let config = PlotConfig::with_height(6);
        assert_eq!(
            plot_series(&values, &config).unwrap(),
            plot_series(&values, &config).unwrap()
        );
    }
}
