use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use mpad::structs::header::{
    ChannelMode, Emphasis, FrameHeader, HEADER_LEN, JointStereoMode, MpegLayer, MpegVersion,
    locate_sync,
};

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing MPEG audio stream: {}", args.input.display());

    let mut input_reader = InputReader::new(&args.input)?;
    let data = input_reader.read_all()?;

    match analyze_stream(&data, cli, multi)? {
        Some(analysis) => {
            display_stream_info(&analysis);
            display_summary(&analysis, data.len());
        }
        None => {
            println!("No MPEG audio frame header found in the file.");
            println!("This doesn't appear to be a valid MPEG audio stream.");
        }
    }

    Ok(())
}

struct StreamAnalysis {
    first_header: FrameHeader,
    frame_count: usize,
    skipped_syncs: usize,
    truncated: bool,
    total_samples: u64,
    variable_bitrate: bool,
}

/// Walks the buffer header by header without decoding audio data.
///
/// A sync word whose header fails full validation counts as a false sync and
/// the scan resumes one byte later, matching the decoder's recovery rule.
fn analyze_stream(
    data: &[u8],
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<Option<StreamAnalysis>> {
    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Counting frames...");
            Some(pb)
        }
        None => None,
    };

    let mut analysis: Option<StreamAnalysis> = None;
    let mut offset = 0;

    while let Some(start) = locate_sync(data, offset) {
        let word = u32::from_be_bytes([
            data[start],
            data[start + 1],
            data[start + 2],
            data[start + 3],
        ]);

        let header = match FrameHeader::read(word) {
            Ok(header) => header,
            Err(err) => {
                if cli.strict && analysis.is_some() {
                    anyhow::bail!("invalid frame header at byte {start}: {err}");
                }
                if let Some(analysis) = analysis.as_mut() {
                    analysis.skipped_syncs += 1;
                }
                offset = start + 1;
                continue;
            }
        };

        let analysis = analysis.get_or_insert_with(|| StreamAnalysis {
            first_header: header.clone(),
            frame_count: 0,
            skipped_syncs: 0,
            truncated: false,
            total_samples: 0,
            variable_bitrate: false,
        });

        if start + HEADER_LEN + header.frame_size > data.len() {
            analysis.truncated = true;
            break;
        }

        analysis.frame_count += 1;
        analysis.total_samples += (header.n_granules() * 576) as u64;
        if header.bitrate != analysis.first_header.bitrate {
            analysis.variable_bitrate = true;
        }

        if analysis.frame_count.is_multiple_of(500) {
            if let Some(pb) = &pb {
                pb.set_message(format!("Counting frames...       {}", analysis.frame_count));
                pb.tick();
            }
        }

        offset = start + HEADER_LEN + header.frame_size;
    }

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    Ok(analysis)
}

fn display_stream_info(analysis: &StreamAnalysis) {
    let header = &analysis.first_header;

    println!();
    println!("MPEG Audio Stream Information");
    println!("=============================");
    println!();
    println!("  Version                   {}", version_str(header.version));
    println!("  Layer                     {}", layer_str(header.layer));
    println!(
        "  Bitrate                   {} kbps{}",
        header.bitrate / 1000,
        if analysis.variable_bitrate {
            " (variable)"
        } else {
            ""
        }
    );
    println!("  Sampling rate             {} Hz", header.sample_rate);
    println!("  Channel mode              {}", mode_str(header.channel_mode));
    println!("  CRC protection            {}", header.has_crc);
    println!("  Emphasis                  {}", emphasis_str(header.emphasis));
    println!("  Copyrighted               {}", header.is_copyrighted);
    println!("  Original                  {}", header.is_original);
    println!();
}

fn display_summary(analysis: &StreamAnalysis, total_bytes: usize) {
    println!("Analysis Summary");
    println!("  Frames                    {}", analysis.frame_count);

    let size_mb = total_bytes as f64 / 1_000_000.0;
    println!("  Size                      {size_mb:.2} MB ({total_bytes} bytes)");

    let duration_secs =
        analysis.total_samples as f64 / f64::from(analysis.first_header.sample_rate);
    println!("  Duration                  {}", time_str(duration_secs));

    if duration_secs > 0.0 {
        let avg_bitrate_kbps = (total_bytes as f64 * 8.0) / (duration_secs * 1000.0);
        println!("  Average data rate         {avg_bitrate_kbps:.1} kbps");
    }

    if analysis.skipped_syncs > 0 {
        println!("  False syncs skipped       {}", analysis.skipped_syncs);
    }
    if analysis.truncated {
        println!("  Final frame               truncated");
    }

    println!();
}

fn version_str(version: MpegVersion) -> &'static str {
    match version {
        MpegVersion::Mpeg1 => "MPEG-1",
        MpegVersion::Mpeg2 => "MPEG-2",
        MpegVersion::Mpeg2p5 => "MPEG-2.5",
    }
}

fn layer_str(layer: MpegLayer) -> &'static str {
    match layer {
        MpegLayer::Layer1 => "I",
        MpegLayer::Layer2 => "II",
        MpegLayer::Layer3 => "III",
    }
}

fn mode_str(mode: ChannelMode) -> &'static str {
    match mode {
        ChannelMode::Mono => "Mono",
        ChannelMode::DualMono => "Dual mono",
        ChannelMode::Stereo => "Stereo",
        ChannelMode::JointStereo(JointStereoMode::Layer3 {
            mid_side: true,
            intensity: true,
        }) => "Joint stereo (mid-side + intensity)",
        ChannelMode::JointStereo(JointStereoMode::Layer3 { mid_side: true, .. }) => {
            "Joint stereo (mid-side)"
        }
        ChannelMode::JointStereo(JointStereoMode::Layer3 { intensity: true, .. }) => {
            "Joint stereo (intensity)"
        }
        ChannelMode::JointStereo(_) => "Joint stereo",
    }
}

fn emphasis_str(emphasis: Emphasis) -> &'static str {
    match emphasis {
        Emphasis::None => "None",
        Emphasis::Fifty15 => "50/15 us",
        Emphasis::CcitJ17 => "CCITT J.17",
    }
}

fn time_str(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_str_formats_boundaries() {
        assert_eq!(time_str(0.0), "00:00:00.000");
        assert_eq!(time_str(59.9995), "00:01:00.000");
        assert_eq!(time_str(3661.5), "01:01:01.500");
    }
}
