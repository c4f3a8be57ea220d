use std::path::Path;

use beamdrift_core::pipeline::config::MotionFitConfig;
use beamdrift_core::pipeline::MotionSummary;
use beamdrift_core::search::SearchOutcome;
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!(
        "  {}",
        s.title
            .apply_to("\u{2550}".repeat(title.chars().count()))
    );
    println!();
}

pub fn print_config_summary(config: &MotionFitConfig, estimate_params: bool) {
    let s = Styles::new();
    print_title(&s, "Beam-Induced Motion");

    let mode = if estimate_params { "parameters" } else { "motion" };
    println!("  {:<14}{}", s.label.apply_to("Estimate"), s.method.apply_to(mode));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Dose/frame"),
        s.value.apply_to(format!("{} e/A^2", config.dose.dose_per_frame))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Pixel size"),
        s.value.apply_to(format!("{} A", config.dose.angpix))
    );
    match config.k_cutoff {
        Some(k) => println!(
            "  {:<14}{}",
            s.label.apply_to("Cutoff"),
            s.value.apply_to(format!("{k} px"))
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Cutoff"),
            s.disabled.apply_to("none")
        ),
    }
    println!();

    println!("  {}", s.header.apply_to("Prior"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Velocity"),
        s.value.apply_to(config.prior.sig_vel)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Divergence"),
        s.value.apply_to(config.prior.sig_div)
    );
    if config.prior.sig_acc > 0.0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Accel."),
            s.value.apply_to(config.prior.sig_acc)
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Accel."),
            s.disabled.apply_to("disabled")
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Kernel"),
        s.method.apply_to(config.prior.kernel)
    );
    println!();

    println!("  {}", s.header.apply_to("Initialization"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Source"),
        s.method.apply_to(config.init.source)
    );
    if config.init.unregularized_global {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Global"),
            s.value.apply_to("unregularized")
        );
    }
    println!();

    if estimate_params {
        println!("  {}", s.header.apply_to("Search"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Steps"),
            s.value
                .apply_to(format!("{} / {}", config.search.r_vel, config.search.r_div))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Rounds"),
            s.value.apply_to(config.search.max_iters)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("TSC"),
            s.method.apply_to(config.search.tsc_mode)
        );
        println!();
    }
}

pub fn print_motion_summary(summary: &MotionSummary, errors: &[f64], output: &Path) {
    let s = Styles::new();
    print_title(&s, "Motion Estimated");

    println!(
        "  {:<14}{}",
        s.label.apply_to("Micrographs"),
        s.value.apply_to(summary.processed())
    );
    if summary.skipped() > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Skipped"),
            s.disabled.apply_to(summary.skipped())
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Particles"),
        s.value.apply_to(summary.particles())
    );
    if !errors.is_empty() {
        let mean = errors.iter().sum::<f64>() / errors.len() as f64;
        println!(
            "  {:<14}{}",
            s.label.apply_to("RMS error"),
            s.value.apply_to(format!("{mean:.4} px"))
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!();
}

pub fn print_search_outcome(outcome: &SearchOutcome) {
    let s = Styles::new();
    print_title(&s, "Motion Parameters");

    let estimate = outcome.estimate();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Velocity"),
        s.value.apply_to(format!("{:.4}", estimate.sig_vel))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Divergence"),
        s.value.apply_to(format!("{:.4}", estimate.sig_div))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Rounds"),
        s.value.apply_to(outcome.rounds())
    );
    if outcome.is_converged() {
        println!("  {:<14}{}", s.label.apply_to("Status"), s.method.apply_to("converged"));
    } else {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Status"),
            s.disabled.apply_to("optimum not bracketed, best sample reported")
        );
    }
    println!();
}

pub fn print_fcc_summary(tables: usize, k_low: usize, k_high: usize, per_frame: &[f64], tsc: f64) {
    let s = Styles::new();
    print_title(&s, "Fourier Cross-Correlation");

    println!(
        "  {:<14}{}",
        s.label.apply_to("Micrographs"),
        s.value.apply_to(tables)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Shells"),
        s.value.apply_to(format!("[{k_low}, {k_high})"))
    );
    println!();

    println!("  {}", s.header.apply_to("Per frame"));
    for (f, v) in per_frame.iter().enumerate() {
        println!(
            "    {:<12}{}",
            s.label.apply_to(f + 1),
            s.value.apply_to(format!("{v:.5}"))
        );
    }
    println!();
    println!("  {:<14}{}", s.label.apply_to("TSC"), s.method.apply_to(format!("{tsc:.6}")));
    println!();
}
