//! Check external tools and the display server.

use reel_common::config::AppConfig;
use reel_common::process::command_exists;
use reel_platform_linux::{detect_display_server, x_display};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("CommentReel System Check");
    println!("{}", "=".repeat(50));

    let display_server = detect_display_server();
    let display = x_display();
    if display_server.supports_region_capture(display.as_deref()) {
        println!(
            "[OK] Display server: {display_server} (DISPLAY={})",
            display.as_deref().unwrap_or("")
        );
    } else {
        println!("[FAIL] Display server: {display_server}; x11grab needs an X11 DISPLAY");
    }

    let tools = [
        ("ffmpeg", config.tools.ffmpeg.as_str()),
        ("ffprobe", config.tools.ffprobe.as_str()),
        ("xdotool", config.tools.xdotool.as_str()),
        ("chromedriver", config.capture.chromedriver.as_str()),
    ];
    let mut all_ok = display_server.supports_region_capture(display.as_deref());
    for (role, binary) in tools {
        if command_exists(binary) {
            println!("[OK] {role}: {binary}");
        } else {
            println!("[FAIL] {role}: {binary} not found on PATH");
            all_ok = false;
        }
    }

    match &config.synthesizer {
        Some(synth) if command_exists(&synth.program) => {
            println!("[OK] synthesizer: {}", synth.program)
        }
        Some(synth) => println!("[WARN] synthesizer: {} not found on PATH", synth.program),
        None if config.stages.audio_generation => {
            println!("[WARN] synthesizer: none configured but audio generation is enabled")
        }
        None => println!("[OK] synthesizer: not needed"),
    }

    println!();
    if all_ok {
        println!("All required tools are available. CommentReel is ready.");
    } else {
        println!("Some required tools are missing. See above.");
    }
    Ok(())
}
