//! raygl CLI - progressive path tracer viewer and offline renderer.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use raygl::offline::{self, RenderJob};
use raygl::scene::{Camera, Scene};
use tracing_subscriber::prelude::*;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let trace_guard = init_tracing();

    let result = match filtered_args.first().copied() {
        None | Some("view") | Some("v") => cmd_view(trace_guard),
        Some("render") | Some("r") => cmd_render(&filtered_args[1..]),
        Some("help") | Some("h") | Some("-h") | Some("--help") => {
            print_help();
            Ok(())
        }
        Some("--version") | Some("-V") => {
            println!(
                "raygl {} (built {} {})",
                env!("CARGO_PKG_VERSION"),
                env!("RAYGL_BUILD_DATE"),
                env!("RAYGL_BUILD_TIME")
            );
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "viewer")]
fn cmd_view(trace_guard: Option<tracing_chrome::FlushGuard>) -> Result<()> {
    raygl::viewer::run(trace_guard)
}

#[cfg(not(feature = "viewer"))]
fn cmd_view(_trace_guard: Option<tracing_chrome::FlushGuard>) -> Result<()> {
    bail!("Viewer not available. Rebuild with: cargo build --features viewer")
}

fn cmd_render(args: &[&str]) -> Result<()> {
    let job = parse_render_args(args)?;
    let summary = offline::render(&job, &Scene::demo(), Camera::default())
        .with_context(|| format!("rendering {}", job.output.display()))?;
    println!(
        "Wrote {} ({} samples, {:.2?})",
        job.output.display(),
        summary.samples,
        summary.elapsed
    );
    Ok(())
}

fn parse_render_args(args: &[&str]) -> Result<RenderJob> {
    let mut job = RenderJob::default();
    let mut iter = args.iter();
    while let Some(&flag) = iter.next() {
        let mut value = || {
            iter.next()
                .copied()
                .with_context(|| format!("{flag} expects a value"))
        };
        match flag {
            "--width" | "-w" => job.width = value()?.parse().context("--width")?,
            "--height" | "-h" => job.height = value()?.parse().context("--height")?,
            "--samples" | "-s" => job.samples = value()?.parse().context("--samples")?,
            "--bounces" | "-b" => job.bounces = value()?.parse().context("--bounces")?,
            "--exposure" | "-e" => job.exposure = value()?.parse().context("--exposure")?,
            "--output" | "-o" => job.output = PathBuf::from(value()?),
            other => bail!("unknown render option '{other}'"),
        }
    }
    Ok(job)
}

fn init_tracing() -> Option<tracing_chrome::FlushGuard> {
    if env::var("RAYGL_TRACE").ok().as_deref() != Some("1") {
        return None;
    }

    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file("trace.json")
        .build();

    let subscriber = tracing_subscriber::registry().with(chrome_layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }

    Some(guard)
}

fn print_help() {
    println!("raygl - progressive multi-bounce path tracer");
    println!();
    println!("USAGE:");
    println!("    raygl [OPTIONS] [COMMAND] [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    v, view                       Open the interactive viewer (default)");
    println!("    r, render [render options]    Render the demo scene to an image file");
    println!("    h, help                       Show this help");
    println!();
    println!("RENDER OPTIONS:");
    println!("    -w, --width <px>       Image width (default 640)");
    println!("    -h, --height <px>      Image height (default 360)");
    println!("    -s, --samples <n>      Samples per pixel (default 64)");
    println!("    -b, --bounces <n>      Bounces per sample, 1-16 (default 4)");
    println!("    -e, --exposure <x>     Exposure for PNG output (default 1.0)");
    println!("    -o, --output <file>    .png (tonemapped), .hdr or .exr (linear)");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only errors");
    println!("    -V, --version    Show version and build date");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG           Log filter (overrides -v/-q)");
    println!("    RAYGL_SHADER_DIR   Load WGSL stages from this directory (R reloads)");
    println!("    RAYGL_TRACE=1      Write a Chrome trace to trace.json");
    println!();
    println!("VIEWER KEYS:");
    println!("    Esc      Quit");
    println!("    R        Reload shaders");
    println!("    Space    Restart accumulation");
}
