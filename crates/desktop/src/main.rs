//! Gatekeep Desktop application entry.

mod app;

fn main() -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 700.0])
            .with_min_inner_size([700.0, 400.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Gatekeep",
        options,
        Box::new(|cc| Box::new(app::ReviewApp::new(cc))),
    )
}
