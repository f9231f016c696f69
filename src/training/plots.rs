//! SVG charts written next to the model artifacts

use crate::model::metrics::{ConfusionMatrix, CLASS_NAMES};
use crate::training::EpochMetrics;
use anyhow::Result;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::Path;

pub const HISTORY_PLOT: &str = "training_history.svg";
pub const CONFUSION_PLOT: &str = "confusion_matrix.svg";

/// Loss and accuracy curves, train vs validation, side by side
pub fn plot_training_history(history: &[EpochMetrics], path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, (1200, 480)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 2));

    let epochs: Vec<f64> = history.iter().map(|m| m.epoch as f64).collect();
    let pick = |f: fn(&EpochMetrics) -> f64| -> Vec<f64> { history.iter().map(f).collect() };

    draw_curves(
        &panels[0],
        "Model Loss",
        "Loss",
        &epochs,
        [("Train", pick(|m| m.loss)), ("Validation", pick(|m| m.val_loss))],
    )?;
    draw_curves(
        &panels[1],
        "Model Accuracy",
        "Accuracy",
        &epochs,
        [
            ("Train", pick(|m| m.accuracy)),
            ("Validation", pick(|m| m.val_accuracy)),
        ],
    )?;

    root.present()?;
    Ok(())
}

fn draw_curves(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    title: &str,
    y_desc: &str,
    epochs: &[f64],
    series: [(&str, Vec<f64>); 2],
) -> Result<()> {
    let x_max = epochs.last().copied().unwrap_or(1.0).max(2.0);
    let (lo, hi) = series
        .iter()
        .flat_map(|(_, ys)| ys.iter().copied())
        .filter(|y| y.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));
    let (lo, hi) = if lo.is_finite() && hi > lo {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    } else if lo.is_finite() {
        (lo - 0.5, lo + 0.5)
    } else {
        (0.0, 1.0)
    };

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(1f64..x_max, lo..hi)?;
    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc(y_desc)
        .draw()?;

    for ((label, ys), color) in series.into_iter().zip([BLUE, RED]) {
        let points: Vec<(f64, f64)> = epochs.iter().copied().zip(ys).collect();
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Annotated 2x2 heatmap, rows actual, columns predicted
pub fn plot_confusion_matrix(cm: &ConfusionMatrix, path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, (640, 560)).into_drawing_area();
    root.fill(&WHITE)?;
    let area = root.titled("Confusion Matrix", ("sans-serif", 24))?;

    let (y_labels, right) = area.split_horizontally(130);
    let (grid, x_labels) = right.split_vertically(440);
    let (y_labels, _) = y_labels.split_vertically(440);

    let counts = cm.as_array();
    let max = counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
    let cells = grid.margin(5, 5, 5, 20).split_evenly((2, 2));

    for (i, cell) in cells.iter().enumerate() {
        let count = counts[i / 2][i % 2];
        let t = count as f64 / max;
        cell.fill(&blend(t))?;

        let (w, h) = cell.dim_in_pixel();
        let text_color = if t > 0.5 { WHITE } else { BLACK };
        cell.draw(&Text::new(
            count.to_string(),
            (w as i32 / 2, h as i32 / 2),
            centered(28, text_color),
        ))?;
    }

    for (row, label_area) in y_labels.margin(5, 5, 0, 0).split_evenly((2, 1)).iter().enumerate() {
        let (w, h) = label_area.dim_in_pixel();
        label_area.draw(&Text::new(
            format!("Actual {}", CLASS_NAMES[row]),
            (w as i32 / 2, h as i32 / 2),
            centered(14, BLACK),
        ))?;
    }

    for (col, label_area) in x_labels.margin(0, 0, 5, 20).split_evenly((1, 2)).iter().enumerate() {
        let (w, h) = label_area.dim_in_pixel();
        label_area.draw(&Text::new(
            format!("Predicted {}", CLASS_NAMES[col]),
            (w as i32 / 2, h as i32 / 2),
            centered(14, BLACK),
        ))?;
    }

    root.present()?;
    Ok(())
}

fn centered(size: u32, color: RGBColor) -> TextStyle<'static> {
    ("sans-serif", size)
        .into_font()
        .color(&color)
        .pos(Pos::new(HPos::Center, VPos::Center))
}

/// Light to dark blue
fn blend(t: f64) -> RGBColor {
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t.clamp(0.0, 1.0)).round() as u8;
    RGBColor(lerp(247, 8), lerp(251, 48), lerp(255, 107))
}
