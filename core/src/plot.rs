//! Training-curve plots, available with the `plots` feature.

#[cfg(feature = "plots")]
mod imp {
    use plotters::prelude::*;
    use std::path::Path;

    /// Render train (blue) and test (red) loss curves against the epoch
    /// index to a PNG.
    ///
    /// The chart carries no text: the pure-Rust text backend has no font
    /// registered, so captions and tick labels would fail to render.
    pub fn plot_training_curves(
        path: &Path,
        train_losses: &[f32],
        test_losses: &[f32],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let epochs = train_losses.len().max(test_losses.len());
        if epochs == 0 {
            return Err("no epochs to plot".into());
        }

        let y_max = train_losses
            .iter()
            .chain(test_losses.iter())
            .cloned()
            .fold(f32::MIN, f32::max)
            .max(1e-6);

        let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(0usize..epochs, 0f32..y_max * 1.05)?;

        chart
            .configure_mesh()
            .x_labels(0)
            .y_labels(0)
            .draw()?;

        chart.draw_series(LineSeries::new(
            train_losses.iter().enumerate().map(|(i, &l)| (i, l)),
            &BLUE,
        ))?;
        chart.draw_series(LineSeries::new(
            test_losses.iter().enumerate().map(|(i, &l)| (i, l)),
            &RED,
        ))?;

        root.present()?;
        Ok(())
    }
}

#[cfg(feature = "plots")]
pub use imp::plot_training_curves;

#[cfg(not(feature = "plots"))]
pub fn plot_training_curves(
    _path: &std::path::Path,
    _train_losses: &[f32],
    _test_losses: &[f32],
) -> Result<(), Box<dyn std::error::Error>> {
    Err("built without the `plots` feature".into())
}
