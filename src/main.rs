use nalgebra::Matrix4;
use std::env;
use std::fs;
use std::path::PathBuf;
use zframe_calibration::detector::DetectorOptions;
use zframe_calibration::{CalibrationParams, RegistrationReport, VolumeShort, ZFrameCalibrator};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "zframe_demo".to_string());
    let config = parse_args(&program)?;

    let img = image::open(&config.input_path)
        .map_err(|e| format!("Failed to open {}: {e}", config.input_path.display()))?
        .to_luma8();
    let width = img.width() as usize;
    let height = img.height() as usize;
    if width != height || !width.is_power_of_two() {
        return Err(format!(
            "Slice must be square with a power-of-two size, got {width}x{height}"
        ));
    }

    // A grayscale row-major buffer already has pixel(x, y) at [y*width + x],
    // the layout the volume view expects for a single slice.
    let buffer: Vec<i16> = img.into_raw().iter().map(|&v| i16::from(v)).collect();

    let [sx, sy] = config.spacing_mm;
    // World origin at the slice centre, axes aligned with the image.
    let transform = Matrix4::new(
        sx,
        0.0,
        0.0,
        -sx * (width as f32 - 1.0) / 2.0,
        0.0,
        sy,
        0.0,
        -sy * (height as f32 - 1.0) / 2.0,
        0.0,
        0.0,
        1.0,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    );
    let volume = VolumeShort::new([width, height, 1], &buffer, transform);

    let params = CalibrationParams {
        detector: DetectorOptions {
            working_size: width,
            ..DetectorOptions::default()
        },
        base_orientation: config.base_orientation,
    };
    let mut calibrator = ZFrameCalibrator::new(params);
    let report = calibrator.register_with_diagnostics(&volume, 0..1);

    if config.format.includes_text() {
        print_text_summary(&report);
    }

    if config.format.includes_json() {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize JSON: {e}"))?;
        if let Some(path) = config.json_out {
            fs::write(&path, json)
                .map_err(|e| format!("Failed to write JSON report to {}: {e}", path.display()))?;
            println!("JSON report written to {}", path.display());
        } else {
            println!("{json}");
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
    Both,
}

impl OutputFormat {
    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "both" => Ok(Self::Both),
            other => Err(format!("Unknown format '{other}'. Use text|json|both.")),
        }
    }

    fn includes_text(&self) -> bool {
        matches!(self, Self::Text | Self::Both)
    }

    fn includes_json(&self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }
}

struct CliConfig {
    input_path: PathBuf,
    format: OutputFormat,
    json_out: Option<PathBuf>,
    spacing_mm: [f32; 2],
    base_orientation: [f32; 4],
}

fn parse_args(program: &str) -> Result<CliConfig, String> {
    let mut args = env::args().skip(1);
    let mut input_path: Option<PathBuf> = None;
    let mut format = OutputFormat::Text;
    let mut json_out: Option<PathBuf> = None;
    let mut spacing_mm = [1.0f32, 1.0];
    let mut base_orientation = [0.0f32, 0.0, 0.0, 1.0];

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("{}", usage(program));
                std::process::exit(0);
            }
            "--format" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--format expects a value\n{}", usage(program)))?;
                format = OutputFormat::from_str(&value)?;
            }
            "--json-out" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--json-out expects a path\n{}", usage(program)))?;
                json_out = Some(PathBuf::from(value));
            }
            "--spacing-mm" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--spacing-mm expects sx,sy\n{}", usage(program)))?;
                spacing_mm = parse_floats::<2>(&value)?;
            }
            "--base" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--base expects x,y,z,w\n{}", usage(program)))?;
                base_orientation = parse_floats::<4>(&value)?;
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option '{arg}'\n{}", usage(program)));
            }
            _ => {
                if input_path.is_some() {
                    return Err(format!(
                        "Unexpected positional argument '{arg}'\n{}",
                        usage(program)
                    ));
                }
                input_path = Some(PathBuf::from(arg));
            }
        }
    }

    let input_path = input_path.ok_or_else(|| usage(program))?;
    Ok(CliConfig {
        input_path,
        format,
        json_out,
        spacing_mm,
        base_orientation,
    })
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} <slice.png> [--spacing-mm sx,sy] [--base x,y,z,w] \\\n         [--format text|json|both] [--json-out report.json]\n\n\
Runs Z-frame registration on a grayscale slice image (square, power-of-two\n\
size) and prints the recovered pose. Positions are relative to the slice\n\
centre.\n\
Examples:\n  {program} slice.png --spacing-mm 1.0,1.0 --format both\n  {program} slice.png --json-out report.json --format json\n"
    )
}

fn parse_floats<const N: usize>(value: &str) -> Result<[f32; N], String> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != N {
        return Err(format!("Expected {N} comma-separated values, got '{value}'"));
    }
    let mut out = [0.0f32; N];
    for (dst, part) in out.iter_mut().zip(parts.iter()) {
        *dst = part
            .trim()
            .parse()
            .map_err(|_| format!("Invalid number '{part}'"))?;
    }
    Ok(out)
}

fn print_text_summary(report: &RegistrationReport) {
    let res = &report.result;
    println!("Registration summary");
    println!("  found: {}", res.found);
    println!(
        "  slices: {}/{} succeeded",
        res.slices_used, res.slices_attempted
    );
    println!("  latency_ms: {:.3}", res.latency_ms);
    if res.found {
        println!(
            "  position [mm]: [{:.3}, {:.3}, {:.3}]",
            res.position.x, res.position.y, res.position.z
        );
        println!(
            "  orientation (x, y, z, w): [{:.5}, {:.5}, {:.5}, {:.5}]",
            res.orientation.i, res.orientation.j, res.orientation.k, res.orientation.w
        );
    }

    for slice in &report.slices {
        match (&slice.pose, slice.failure) {
            (Some(pose), _) => println!(
                "  slice {}: position [{:.2}, {:.2}, {:.2}] in {:.3} ms",
                slice.slice_index,
                pose.position.x,
                pose.position.y,
                pose.position.z,
                slice.elapsed_ms
            ),
            (None, Some(reason)) => {
                println!("  slice {}: skipped ({reason})", slice.slice_index)
            }
            (None, None) => println!("  slice {}: skipped", slice.slice_index),
        }
    }
}
