//! Runs the framebuffer example headless.
//!
//! By default the software device is used. `--vulkan` runs on the first Vulkan 1.3 device instead, which needs the SPIR-V
//! shaders compiled by the build script.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use framebuffer::{FramebufferApp, Settings};
use frameline::{
    ash::vk,
    context::{Device, VulkanDevice},
    driver::{DriverConfig, FrameDriver},
    input::ScriptedInput,
    overlay::{HeadlessUi, Overlay},
    presentation::OffscreenWindow,
    resources::DEFAULT_COLOR_FORMAT,
    sim::SimDevice,
    timer::{FixedUpdateTimer, FrameClock},
};

const RESOLUTION: vk::Extent2D = vk::Extent2D {
    width: 640,
    height: 480,
};

#[derive(Parser, Debug)]
#[command(about = "Rotating pyramid rendered into an offscreen framebuffer", long_about = None)]
struct Args {
    /// Number of frames to render before stopping.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Frames that may be in flight at the same time.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    in_flight: u32,

    /// Blit the attachment to the presented image instead of copying it.
    #[arg(long)]
    blit: bool,

    /// Present the depth attachment. Copying depth into a color image is only possible on the software device.
    #[arg(long, conflicts_with = "vulkan")]
    depth: bool,

    /// Run updates at a fixed rate in Hz instead of once per frame.
    #[arg(long, value_name = "HZ")]
    fixed_update: Option<f32>,

    /// Use the first Vulkan 1.3 device instead of the software device.
    #[arg(long)]
    vulkan: bool,
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let args = Args::parse();

    let device: Arc<dyn Device> = if args.vulkan {
        VulkanDevice::new_headless()?
    } else {
        SimDevice::new().into_device()
    };
    log::info!("Running on {}", device.name());

    let window = OffscreenWindow::new(
        &device,
        RESOLUTION,
        args.in_flight as usize,
        DEFAULT_COLOR_FORMAT,
    )?;

    let settings = Settings::default();
    settings.attachment.set(if args.depth { 1 } else { 0 });
    settings.transfer.set(if args.blit { 1 } else { 0 });

    let mut config = DriverConfig::default().with_max_frames(args.frames);
    if let Some(rate) = args.fixed_update {
        config = config.with_timer(FixedUpdateTimer::new(rate));
    }
    //the software device is much faster than real time, keep the animation comparable
    if !args.vulkan {
        config = config.with_clock(FrameClock::simulated(Duration::from_micros(16_667)));
    }

    let mut driver = FrameDriver::new(device, Box::new(window), Box::new(ScriptedInput::new()))
        .with_config(config)
        .with_ui(Box::new(HeadlessUi::new()))
        .with_overlay(Overlay::new().with_stats_window())
        .with_element(FramebufferApp::new(settings))?;

    driver.run()?;
    log::info!("Rendered {} frames", driver.frames_rendered());
    Ok(())
}
