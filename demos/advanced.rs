//! Advanced AR fusion demonstration
//!
//! Runs both halves of the library the way an AR viewer would:
//! sensor callbacks feeding a shared estimator on one thread, a fixed-rate
//! fuse loop on another, and camera preview frames converted to RGB565.
//!
//! Features demonstrated:
//! - Event-style sensor ingestion through `SharedFusion`
//! - Background fusion with `FuseLoop`
//! - Custom filter settings
//! - Flag monitoring (seeding, rejected accelerometer/magnetometer pairs)
//! - CSV export and plots of the absolute, gyroscope and fused azimuth
//! - Camera frame conversion and a texture dump
//!
//! Run with: `RUST_LOG=debug cargo run --example advanced`

use ar_fusion::{
    FuseLoop, FusionSettings, FusionState, PixelConverter, RAD_TO_DEG, SensorEvent, SharedFusion,
    unpack_rgb565,
};
use log::info;
use nalgebra::Vector3;
use plotters::prelude::*;
use rand::prelude::*;
use rand_pcg::Pcg64;
use serde::Serialize;
use std::error::Error;
use std::time::Duration;

const SAMPLE_PERIOD_NS: i64 = 10_000_000; // 100 Hz
const DURATION_S: f32 = 20.0;
const FRAME_WIDTH: usize = 320;
const FRAME_HEIGHT: usize = 240;

#[derive(Debug, Serialize)]
struct OrientationRecord {
    #[serde(rename = "Time (s)")]
    time: f32,
    #[serde(rename = "True azimuth (deg)")]
    true_azimuth: f32,
    #[serde(rename = "AccMag azimuth (deg)")]
    acc_mag_azimuth: f32,
    #[serde(rename = "Gyroscope azimuth (deg)")]
    gyro_azimuth: f32,
    #[serde(rename = "Fused azimuth (deg)")]
    fused_azimuth: f32,
    #[serde(rename = "AccMag rejected")]
    acc_mag_rejected: bool,
}

/// Synthetic level device turning back and forth, with gyroscope bias,
/// sensor noise and a short free fall
struct SensorSimulator {
    rng: Pcg64,
    step: i64,
}

impl SensorSimulator {
    fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
            step: 0,
        }
    }

    fn true_azimuth(time: f32) -> f32 {
        1.2 * (0.3 * time).sin()
    }

    fn next(&mut self) -> (f32, [SensorEvent; 3]) {
        let time = self.step as f32 * SAMPLE_PERIOD_NS as f32 * 1e-9;
        let azimuth = Self::true_azimuth(time);
        let azimuth_rate = 1.2 * 0.3 * (0.3 * time).cos();
        let rng = &mut self.rng;

        let gyroscope = Vector3::new(
            rng.random_range(-0.02..0.02),
            rng.random_range(-0.02..0.02),
            -azimuth_rate + 0.015 + rng.random_range(-0.02..0.02),
        );

        let free_fall = (8.0..8.5).contains(&time);
        let accelerometer = if free_fall {
            Vector3::new(0.1, -0.1, 0.2)
        } else {
            Vector3::new(
                rng.random_range(-0.1..0.1),
                rng.random_range(-0.1..0.1),
                9.81 + rng.random_range(-0.1..0.1),
            )
        };

        let magnetometer = Vector3::new(
            -25.0 * azimuth.sin() + rng.random_range(-1.0..1.0),
            25.0 * azimuth.cos() + rng.random_range(-1.0..1.0),
            -40.0 + rng.random_range(-1.0..1.0),
        );

        let events = [
            SensorEvent::Magnetometer(magnetometer),
            SensorEvent::Accelerometer(accelerometer),
            SensorEvent::Gyroscope {
                rate: gyroscope,
                timestamp_ns: self.step * SAMPLE_PERIOD_NS,
            },
        ];
        self.step += 1;
        (time, events)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    println!("Advanced AR fusion example - threaded fusion and frame conversion");

    let settings = FusionSettings {
        filter_coefficient: 0.98,
        fuse_period: Duration::from_millis(50),
        fuse_start_delay: Duration::from_millis(100),
        ..Default::default()
    };
    println!(
        "Filter coefficient {:.2}, fuse every {:?}",
        settings.filter_coefficient, settings.fuse_period
    );

    run_threaded(settings)?;
    let records = run_replay(settings)?;

    write_csv("fusion_output.csv", &records)?;
    println!("✓ Orientation trace saved to fusion_output.csv");

    create_plots("fusion_plots.png", &records)?;
    println!("✓ Plots saved to fusion_plots.png");

    convert_frame()?;
    Ok(())
}

/// Drive a shared estimator from a sensor thread while the fuse loop runs
fn run_threaded(settings: FusionSettings) -> Result<(), Box<dyn Error>> {
    let shared = SharedFusion::with_settings(settings);
    let fuse_loop = FuseLoop::spawn(shared.clone());

    let sensor_thread = {
        let shared = shared.clone();
        std::thread::spawn(move || {
            let mut simulator = SensorSimulator::new(1);
            // two seconds of real-time sensor callbacks
            for _ in 0..200 {
                let (_, events) = simulator.next();
                for event in events {
                    shared.handle_event(event);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let mut received = 0;
    while let Ok(rotation) = fuse_loop.receiver().recv_timeout(Duration::from_millis(500)) {
        received += 1;
        if received % 10 == 0 {
            println!(
                "fuse #{received}: pitch {:.1}° roll {:.1}° heading {:.1}°",
                rotation.pitch * RAD_TO_DEG,
                rotation.roll * RAD_TO_DEG,
                rotation.heading * RAD_TO_DEG
            );
        }
        if sensor_thread.is_finished() {
            break;
        }
    }

    sensor_thread
        .join()
        .map_err(|_| "sensor thread panicked")?;
    fuse_loop.stop();

    info!("threaded run finished after {received} fused outputs");
    println!(
        "Threaded run: {received} fused outputs, state {:?}",
        shared.state()
    );
    Ok(())
}

/// Replay the synthetic trace deterministically and record every fuse step
fn run_replay(settings: FusionSettings) -> Result<Vec<OrientationRecord>, Box<dyn Error>> {
    let shared = SharedFusion::with_settings(settings);
    let mut simulator = SensorSimulator::new(2);
    let samples = (DURATION_S * 1e9 / SAMPLE_PERIOD_NS as f32) as usize;
    let fuse_every = (settings.fuse_period.as_nanos() as i64 / SAMPLE_PERIOD_NS).max(1) as usize;

    println!("Processing {samples} sensor samples...");
    let mut records = Vec::new();

    for index in 0..samples {
        let (time, events) = simulator.next();
        for event in events {
            shared.handle_event(event);
        }

        if index % fuse_every != fuse_every - 1 {
            continue;
        }

        let record = shared.with_lock(|fusion| {
            // the gyroscope estimate just before it is corrected
            let gyro_azimuth = fusion.gyro_orientation().x;
            fusion.fuse();
            OrientationRecord {
                time,
                true_azimuth: SensorSimulator::true_azimuth(time) * RAD_TO_DEG,
                acc_mag_azimuth: fusion.acc_mag_orientation().x * RAD_TO_DEG,
                gyro_azimuth: gyro_azimuth * RAD_TO_DEG,
                fused_azimuth: fusion.fused_orientation().x * RAD_TO_DEG,
                acc_mag_rejected: fusion.flags().acc_mag_rejected,
            }
        });

        if index % 500 == fuse_every - 1 {
            println!(
                "t={:.1}s: true={:.1}° fused={:.1}° rejected={}",
                record.time, record.true_azimuth, record.fused_azimuth, record.acc_mag_rejected
            );
        }
        records.push(record);
    }

    if shared.state() != FusionState::Tracking {
        return Err("estimator never started tracking".into());
    }
    Ok(records)
}

fn write_csv(path: &str, records: &[OrientationRecord]) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Plot the azimuth estimates and the rejection flag over time
fn create_plots(path: &str, records: &[OrientationRecord]) -> Result<(), Box<dyn Error>> {
    let (first, last) = match (records.first(), records.last()) {
        (Some(first), Some(last)) => (first.time, last.time),
        _ => return Err("no records to plot".into()),
    };

    let root = BitMapBackend::new(path, (1000, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(560);

    let mut chart = ChartBuilder::on(&upper)
        .caption("Azimuth: absolute, gyroscope and fused", ("sans-serif", 20))
        .margin(5)
        .x_label_area_size(0)
        .y_label_area_size(50)
        .build_cartesian_2d(first..last, -90f32..90f32)?;

    chart.configure_mesh().y_desc("Degrees").draw()?;

    let series: [(&str, RGBColor, fn(&OrientationRecord) -> f32); 4] = [
        ("True", BLACK, |r| r.true_azimuth),
        ("Accelerometer/magnetometer", RGBColor(128, 128, 0), |r| {
            r.acc_mag_azimuth
        }),
        ("Gyroscope", BLUE, |r| r.gyro_azimuth),
        ("Fused", RED, |r| r.fused_azimuth),
    ];

    for (label, color, value) in series {
        chart
            .draw_series(LineSeries::new(
                records.iter().map(|r| (r.time, value(r))),
                &color,
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], color));
    }
    chart.configure_series_labels().draw()?;

    let mut flag_chart = ChartBuilder::on(&lower)
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(first..last, -0.1f32..1.1f32)?;

    flag_chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_label_formatter(&|y| {
            if *y < 0.5 {
                "False".to_string()
            } else {
                "True".to_string()
            }
        })
        .draw()?;

    flag_chart
        .draw_series(LineSeries::new(
            records
                .iter()
                .map(|r| (r.time, if r.acc_mag_rejected { 1.0 } else { 0.0 })),
            &CYAN,
        ))?
        .label("AccMag rejected")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], CYAN));
    flag_chart.configure_series_labels().draw()?;

    root.present()?;
    Ok(())
}

/// Convert a synthetic color-bar preview frame and save it as an image
fn convert_frame() -> Result<(), Box<dyn Error>> {
    let converter = PixelConverter::new(FRAME_WIDTH, FRAME_HEIGHT)?;

    // luma ramp left to right, eight chroma bars
    let mut frame = Vec::with_capacity(converter.source_len());
    for _ in 0..FRAME_HEIGHT {
        frame.extend((0..FRAME_WIDTH).map(|x| (x * 255 / FRAME_WIDTH) as u8));
    }
    for _ in 0..FRAME_HEIGHT.div_ceil(2) {
        for x in (0..FRAME_WIDTH).step_by(2) {
            let bar = (x * 8 / FRAME_WIDTH) as u8;
            frame.push(bar.wrapping_mul(32)); // Cr
            frame.push(255 - bar.wrapping_mul(32)); // Cb
        }
    }

    let texture = converter.convert_to_vec(&frame)?;
    println!(
        "Converted {}x{} frame: {} source bytes -> {} texture bytes",
        FRAME_WIDTH,
        FRAME_HEIGHT,
        frame.len(),
        texture.len()
    );

    let root = BitMapBackend::new(
        "frame_rgb565.png",
        (FRAME_WIDTH as u32, FRAME_HEIGHT as u32),
    )
    .into_drawing_area();
    for (index, pixel) in texture[..converter.output_len()].chunks_exact(2).enumerate() {
        let [r, g, b] = unpack_rgb565(pixel[0], pixel[1]);
        let (x, y) = (index % FRAME_WIDTH, index / FRAME_WIDTH);
        root.draw_pixel((x as i32, y as i32), &RGBColor(r, g, b))?;
    }
    root.present()?;
    println!("✓ Converted frame saved to frame_rgb565.png");
    Ok(())
}
