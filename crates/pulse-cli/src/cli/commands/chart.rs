//! Chart command handler.

use std::io::Read;

use anyhow::{Context, Result};
use pulse_core::chart::{LabelFormat, PlotConfig, plot_series};

#[derive(clap::Args, Debug)]
pub struct ChartArgs {
    /// Values to plot (read from stdin when omitted, separated by commas or whitespace).
    /// `nan` leaves a gap.
    #[arg(value_name = "VALUES", allow_negative_numbers = true)]
    values: Vec<f64>,

    /// Rows between the minimum and maximum
    #[arg(long)]
    height: Option<usize>,

    /// Bottom of the plotted range
    #[arg(long, allow_negative_numbers = true)]
    min: Option<f64>,

    /// Top of the plotted range
    #[arg(long, allow_negative_numbers = true)]
    max: Option<f64>,

    /// Columns reserved left of the first point
    #[arg(long, default_value_t = 3)]
    offset: usize,

    /// Decimal places of the axis labels
    #[arg(long, default_value_t = 2)]
    precision: usize,
}

impl ChartArgs {
    fn plot_config(&self) -> PlotConfig {
        PlotConfig {
            min: self.min,
            max: self.max,
            height: self.height,
            offset: self.offset,
            label: LabelFormat {
                precision: self.precision,
                ..LabelFormat::default()
            },
            ..PlotConfig::default()
        }
    }
}

fn parse_values(text: &str) -> Result<Vec<f64>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("invalid value '{token}'"))
        })
        .collect()
}

pub fn run(args: &ChartArgs) -> Result<()> {
    let values = if args.values.is_empty() {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("read values from stdin")?;
        parse_values(&input)?
    } else {
        args.values.clone()
    };

    let chart = plot_series(&values, &args.plot_config())?;
    if !chart.is_empty() {
        println!("{chart}");
    }
    Ok(())
}
