use std::fs::File;

use anyhow::{Context, Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{Level, info, warn};

use mpad::process::decode::Decoder;
use mpad::utils::errors::DecodeError;

use super::command::{Cli, DecodeArgs};
use crate::input::InputReader;
use crate::wav::WavWriter;

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut input = InputReader::new(&args.input)
        .with_context(|| format!("failed to open input: {}", args.input.display()))?;

    let output_path = match &args.output_path {
        Some(path) => path.clone(),
        None if input.is_pipe() => bail!("--output is required when reading from stdin"),
        None => args.input.with_extension("wav"),
    };

    info!("Decoding MPEG audio stream: {}", args.input.display());

    let data = input.read_all()?;

    let mut decoder = Decoder::default();
    decoder.set_input(&data);
    decoder.set_ignore_crc(args.ignore_crc);
    if cli.strict {
        decoder.set_fail_level(Level::Warn);
    }

    let progress = multi.map(|multi| {
        let pb = multi.add(ProgressBar::new(data.len() as u64));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    });

    let mut writer: Option<WavWriter<File>> = None;
    let mut interleaved = Vec::with_capacity(2 * 1152);
    let mut frames = 0u64;
    let mut skipped = 0u64;

    loop {
        if !decoder.decode_frame() {
            match decoder.error() {
                // End of buffer: no further frame fits in the remaining input.
                None | Some(DecodeError::BufferLength) => break,
                Some(err) if err.is_recoverable() && !cli.strict => {
                    warn!("skipping frame at byte {}: {err}", decoder.current_frame());
                    skipped += 1;
                    continue;
                }
                Some(err) => {
                    bail!("decoding failed at byte {}: {err}", decoder.current_frame())
                }
            }
        }

        decoder.synth_frame();

        if writer.is_none() {
            let file = File::create(&output_path)
                .with_context(|| format!("failed to create output: {}", output_path.display()))?;
            let mut wav = WavWriter::new(file, decoder.sample_rate(), decoder.channels() as u16);
            wav.write_header()?;
            writer = Some(wav);
        }

        let channels = decoder.channels();
        interleaved.clear();
        for i in 0..decoder.pcm(0).len() {
            for ch in 0..channels {
                let sample = decoder.pcm(ch)[i].clamp(-1.0, 1.0);
                interleaved.push((sample * 32767.0) as i16);
            }
        }
        if let Some(wav) = &mut writer {
            wav.write_pcm_16bit(&interleaved)?;
        }
        frames += 1;

        if let Some(pb) = &progress {
            pb.set_position(decoder.next_frame() as u64);
        }
    }

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let Some(mut writer) = writer else {
        bail!("no decodable audio frames in {}", args.input.display());
    };
    writer.finish()?;

    let seconds = writer.frames_written() as f64 / f64::from(decoder.sample_rate());
    info!(
        "Wrote {}: {frames} frames ({seconds:.3} s), {skipped} skipped",
        output_path.display()
    );

    Ok(())
}
