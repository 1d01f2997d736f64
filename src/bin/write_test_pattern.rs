// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

// This program writes a hundred frames of a moving gradient to a file
// called recorded_frames in your current directory, for vpilot-drive to
// replay.

use std::{fs::File, io::BufWriter};

use log::info;
use vpilot_drive_lib::frame::{Frame, PixelFormat};
use vpilot_drive_lib::recording::RecordWriter;
use vpilot_drive_lib::{FRAME_HEIGHT, FRAME_WIDTH};

const FRAME_COUNT: usize = 100;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_env()?;

    let width = FRAME_WIDTH as usize;
    let height = FRAME_HEIGHT as usize;
    let mut writer = RecordWriter::new(BufWriter::new(File::create_new("recorded_frames")?));

    for n in 0..FRAME_COUNT {
        let mut bgr = Vec::with_capacity(width * height * 3);
        for row in 0..height {
            for col in 0..width {
                bgr.push(((col * 255 / width + n) % 256) as u8);
                bgr.push((row * 255 / height) as u8);
                bgr.push((n * 2 % 256) as u8);
            }
        }
        writer.write_frame(&Frame::new(width, height, PixelFormat::Bgr8, bgr)?)?;
    }
    writer.finish()?;

    info!("wrote {FRAME_COUNT} frames of {width}x{height} to recorded_frames");
    Ok(())
}
