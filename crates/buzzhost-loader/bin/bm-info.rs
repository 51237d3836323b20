//! Prints what a machine library declares, and optionally renders a few
//! blocks from it.
//!
//! Usage: bm-info <machine.so> [blocks]

use std::env;
use std::process::ExitCode;

use buzzhost_loader::abi::{WM_READWRITE, WM_WRITE, MT_GENERATOR};
use buzzhost_loader::{Loader, LoaderConfig, ParameterInfo};

const BLOCK_LEN: usize = 256;

fn print_parameter(index: usize, p: &ParameterInfo, describe: String) {
    println!(
        "  {:3} {:<16} {:?} min={} max={} none={} default={} ({}){}",
        index,
        p.name,
        p.param_type,
        p.min_value,
        p.max_value,
        p.no_value,
        p.default_value,
        describe,
        if p.is_state() { " state" } else { "" }
    );
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: bm-info <machine.so> [blocks]");
        return ExitCode::FAILURE;
    };
    let blocks: usize = env::args()
        .nth(2)
        .and_then(|b| b.parse().ok())
        .unwrap_or(0);

    let loader = Loader::new(LoaderConfig::default());
    let mut machine = match loader.open(&path) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let meta = machine.metadata();
    println!("{} ({})", meta.name, meta.library);
    println!("  short name: {}", meta.short_name);
    println!("  author:     {}", meta.author);
    println!(
        "  type {} version {:#x} flags {:#x} ({:?} callbacks)",
        meta.machine_type,
        meta.version,
        meta.flags,
        meta.generation()
    );
    println!("  tracks:     {}..{}", meta.min_tracks, meta.max_tracks);
    println!(
        "  channels:   {} in / {} out",
        meta.input_channels, meta.output_channels
    );
    for command in meta.command_list() {
        println!("  command:    {}", command);
    }

    println!("global parameters:");
    for (i, p) in meta.global_parameters.iter().enumerate() {
        let text = machine.describe_global_value(i, p.default_value);
        print_parameter(i, p, text);
    }
    println!("track parameters:");
    for (i, p) in meta.track_parameters.iter().enumerate() {
        let text = machine.describe_track_value(i, p.default_value);
        print_parameter(i, p, text);
    }
    println!("attributes:");
    for a in &meta.attributes {
        println!(
            "  {:<20} {}..{} default {}",
            a.name, a.min_value, a.max_value, a.default_value
        );
    }

    if blocks == 0 {
        return ExitCode::SUCCESS;
    }

    let mut instance = match machine.instantiate() {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    instance.initialize(&[]);

    let mode = if meta.machine_type == MT_GENERATOR {
        WM_WRITE
    } else {
        WM_READWRITE
    };
    let stereo = meta.output_channels == 2;
    let mut peak = 0.0f32;
    for _ in 0..blocks {
        instance.tick();
        let mut mono = [0.0f32; BLOCK_LEN];
        let active = if stereo {
            let mut out = [0.0f32; 2 * BLOCK_LEN];
            let active = instance.run_block_mono_to_stereo(&mut mono, &mut out, mode);
            peak = out.iter().fold(peak, |m, s| m.max(s.abs()));
            active
        } else {
            let active = instance.run_block(&mut mono, mode);
            peak = mono.iter().fold(peak, |m, s| m.max(s.abs()));
            active
        };
        if !active {
            tracing::debug!("machine reported silence");
        }
    }
    println!(
        "rendered {} blocks of {} frames, peak {:.1}",
        blocks, BLOCK_LEN, peak
    );
    ExitCode::SUCCESS
}
