//! This module renders the charts of a run from finished results.

use crate::export::{category_rows, stage_rows};
use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;
use stemforge_core::{BioprocessResult, ScenarioOutcome};

const HISTOGRAM_BINS: usize = 40;

/// The main function to generate and save all charts of a single scenario.
pub fn generate_scenario_plots(output_dir: &Path, result: &BioprocessResult) -> Result<()> {
    println!("[Plotting] Generating charts...");

    let categories = category_rows(&result.failure.costs);
    plot_bars(
        &output_dir.join("1_cost_by_category.png"),
        "Cost per Successful Process by Category",
        &categories,
        BLUE,
    )?;
    let stages = stage_rows(&result.failure.stages);
    plot_bars(
        &output_dir.join("2_cost_by_stage.png"),
        "Cost per Successful Process by Stage",
        &stages,
        GREEN,
    )?;
    plot_final_distribution(
        &output_dir.join("3_final_cell_distribution.png"),
        &result.final_cell_distribution,
        result.conditions.target_cell_number as f64,
    )?;

    println!("[Plotting] Charts have been saved to '{}'.", output_dir.display());
    Ok(())
}

/// Cost per million cells of every scenario that finished.
pub fn plot_comparison(output_dir: &Path, study: &str, outcomes: &[ScenarioOutcome]) -> Result<()> {
    let bars: Vec<(&str, f64)> = outcomes
        .iter()
        .filter_map(|o| o.succeeded().map(|r| (o.name.as_str(), r.cost_per_million_cells())))
        .collect();
    if bars.is_empty() {
        println!("[Plotting] Warning: No finished scenario to compare.");
        return Ok(());
    }
    plot_bars(
        &output_dir.join("comparison.png"),
        &format!("Cost per Million Cells: {}", study),
        &bars,
        RED,
    )
}

fn plot_bars(path: &Path, caption: &str, bars: &[(&str, f64)], color: RGBColor) -> Result<()> {
    let root = BitMapBackend::new(path, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_value = bars.iter().map(|(_, v)| *v).fold(0.0, f64::max).max(1.0);
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 36).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d((0..bars.len()).into_segmented(), 0f64..max_value * 1.1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc("Cost")
        .x_label_formatter(&|segment| match segment {
            SegmentValue::CenterOf(i) => bars.get(*i).map_or(String::new(), |(name, _)| name.to_string()),
            _ => String::new(),
        })
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(color.mix(0.8).filled())
            .margin(20)
            .data(bars.iter().enumerate().map(|(i, (_, value))| (i, *value))),
    )?;

    root.present()?;
    Ok(())
}

/// Histogram of final cell numbers, in billions, with the target marked.
fn plot_final_distribution(path: &Path, cells: &[f64], target: f64) -> Result<()> {
    if cells.is_empty() {
        println!("[Plotting] Warning: No final cell numbers to plot.");
        return Ok(());
    }
    let scale = 1e9;
    let low = cells.iter().copied().fold(f64::INFINITY, f64::min).min(target) / scale;
    let high = cells.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(target) / scale;
    let width = ((high - low) / HISTOGRAM_BINS as f64).max(f64::EPSILON);

    let mut counts = vec![0u32; HISTOGRAM_BINS];
    for value in cells {
        let bin = (((value / scale - low) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(1);

    let root = BitMapBackend::new(path, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Final Cell Number Distribution", ("sans-serif", 36).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(low..high, 0u32..max_count + max_count / 10 + 1)?;

    chart
        .configure_mesh()
        .x_desc("Cells (billions)")
        .y_desc("Runs")
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
        let x0 = low + i as f64 * width;
        Rectangle::new([(x0, 0), (x0 + width, count)], BLUE.mix(0.6).filled())
    }))?;

    let target = target / scale;
    chart
        .draw_series(LineSeries::new(
            [(target, 0), (target, max_count)],
            RED.stroke_width(2),
        ))?
        .label("Target")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.filled()));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
