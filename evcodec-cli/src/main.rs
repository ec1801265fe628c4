//! Event camera recording decoder CLI.
//!
//! Replays a raw sensor recording as a sequence of event packets and decodes
//! them, optionally in fixed time frames and with per-packet deduplication.

use anyhow::{bail, Context, Result};
use clap::Parser;
use evcodec_core::output::{CsvWriter, TriggerCsvWriter};
use evcodec_core::{
    CodecTable, Decoder, DedupPolicy, EventCounts, EventDecoder, PacketView, RecordingHeader,
    UniqueDecoder,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{stderr, BufReader, Read};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Decoder for raw event camera recordings.
///
/// The recording body is cut into fixed-size packets which are fed to the
/// decoder one after another, the same way a live sensor driver would.
#[derive(Parser, Debug)]
#[command(name = "evcodec")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input .raw recording
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Write CD events as CSV (x,y,p,t) to this path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write trigger events as CSV (p,t,id) to this path
    #[arg(short, long, value_name = "PATH")]
    triggers: Option<PathBuf>,

    /// Encoding of the event stream. Defaults to what the recording header
    /// declares.
    #[arg(short, long)]
    encoding: Option<String>,

    /// Sensor width, overriding the recording header
    #[arg(long)]
    width: Option<u16>,

    /// Sensor height, overriding the recording header
    #[arg(long)]
    height: Option<u16>,

    /// Time base added to every decoded timestamp
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    time_base: i64,

    /// Packet payload size in bytes
    #[arg(short, long, default_value_t = 65536)]
    packet_size: usize,

    /// Decode in frames of this many time units using time-bounded decoding
    #[arg(short, long, value_name = "TICKS")]
    frame_interval: Option<i64>,

    /// Drop repeated pixel addresses within each packet
    #[arg(short, long)]
    unique: bool,

    /// With --unique, split packets at repeats instead of dropping events
    #[arg(long, requires = "unique")]
    split: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Default)]
struct Summary {
    packets: u64,
    frames: u64,
    faults: u64,
    written_cd: u64,
    written_triggers: u64,
}

/// Where decoded events go.
struct Sinks {
    cd: Option<CsvWriter<File>>,
    triggers: Option<TriggerCsvWriter<File>>,
}

impl Sinks {
    fn open(args: &Args, geometry: (u16, u16)) -> Result<Self> {
        let cd = match &args.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {:?}", path))?;
                let mut writer = CsvWriter::new(file);
                writer.write_header(Some(geometry))?;
                Some(writer)
            }
            None => None,
        };
        let triggers = match &args.triggers {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {:?}", path))?;
                let mut writer = TriggerCsvWriter::new(file);
                writer.write_header()?;
                Some(writer)
            }
            None => None,
        };
        Ok(Self { cd, triggers })
    }

    fn drain<D: EventDecoder>(&mut self, decoder: &mut D, summary: &mut Summary) -> Result<()> {
        let cd = decoder.get_cd_events();
        let triggers = decoder.get_ext_trig_events();
        if let Some(writer) = &mut self.cd {
            writer
                .write_events(&cd)
                .context("Failed to write CSV output")?;
            summary.written_cd += cd.len() as u64;
        }
        if let Some(writer) = &mut self.triggers {
            writer
                .write_events(&triggers)
                .context("Failed to write trigger CSV")?;
            summary.written_triggers += triggers.len() as u64;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(writer) = &mut self.cd {
            writer.flush()?;
        }
        if let Some(writer) = &mut self.triggers {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Next frame boundary strictly after `time`.
fn next_frame(mut frame_time: i64, time: i64, interval: i64) -> i64 {
    while frame_time <= time {
        frame_time += interval;
    }
    frame_time
}

fn run<D: EventDecoder, R: Read>(
    decoder: &mut D,
    reader: &mut R,
    args: &Args,
    encoding: &str,
    geometry: (u16, u16),
    sinks: &mut Sinks,
    progress: &ProgressBar,
) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut buf = vec![0u8; args.packet_size];
    let mut frame_time: Option<i64> = None;

    loop {
        let n = reader.read(&mut buf).context("Failed to read recording")?;
        if n == 0 {
            break;
        }
        progress.inc(n as u64);
        summary.packets += 1;
        let packet = PacketView::new(encoding, geometry.0, geometry.1, args.time_base, &buf[..n]);

        let Some(interval) = args.frame_interval else {
            if let Err(e) = decoder.decode(&packet) {
                warn!(packet = summary.packets, "{}", e);
                summary.faults += 1;
            }
            sinks.drain(decoder, &mut summary)?;
            continue;
        };

        if frame_time.is_none() {
            if let Some(first) = decoder.find_first_sensor_time(&packet)? {
                debug!(first, "first sensor time");
                frame_time = Some(first + interval);
            }
        }
        let Some(mut limit) = frame_time else {
            // No events yet; the packet may still hold stream state.
            if let Err(e) = decoder.decode(&packet) {
                warn!(packet = summary.packets, "{}", e);
                summary.faults += 1;
            }
            sinks.drain(decoder, &mut summary)?;
            continue;
        };

        loop {
            match decoder.decode_until(&packet, limit) {
                Ok(result) => {
                    sinks.drain(decoder, &mut summary)?;
                    if !result.reached_limit {
                        break;
                    }
                    summary.frames += 1;
                    limit = next_frame(limit, result.next_time, interval);
                }
                Err(e) => {
                    warn!(packet = summary.packets, "{}", e);
                    summary.faults += 1;
                    sinks.drain(decoder, &mut summary)?;
                    break;
                }
            }
        }
        frame_time = Some(limit);
    }

    Ok(summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("EVCODEC_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.packet_size == 0 {
        bail!("--packet-size must be positive");
    }
    if matches!(args.frame_interval, Some(i) if i <= 0) {
        bail!("--frame-interval must be positive");
    }

    let file = File::open(&args.input).with_context(|| format!("Failed to open {:?}", args.input))?;
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut reader = BufReader::new(file);
    let header = RecordingHeader::read(&mut reader).context("Failed to read recording header")?;
    debug!(?header, "recording header");

    let encoding = args
        .encoding
        .clone()
        .or(header.encoding)
        .unwrap_or_else(|| "evt3".to_string());
    let codecs = CodecTable::default();
    if !codecs.contains(&encoding) {
        bail!(
            "Unsupported encoding {:?}. Known encodings: {}",
            encoding,
            codecs.encodings().join(", ")
        );
    }
    let (Some(width), Some(height)) = (args.width.or(header.width), args.height.or(header.height))
    else {
        bail!("Sensor geometry unknown; pass --width and --height");
    };
    info!(%encoding, width, height, "decoding {:?}", args.input);

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(file_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40} {bytes}/{total_bytes} {msg}")
                .context("Invalid progress template")?,
        );
        pb.set_message("Decoding...");
        pb
    };

    let start_time = Instant::now();
    let mut sinks = Sinks::open(&args, (width, height))?;

    let (summary, counts, suppressed): (Summary, EventCounts, Option<u64>) = if args.unique {
        let policy = if args.split {
            DedupPolicy::SplitPackets
        } else {
            DedupPolicy::KeepLatest
        };
        let mut decoder = UniqueDecoder::from_decoder(Decoder::with_codecs(codecs), policy);
        let summary = run(
            &mut decoder,
            &mut reader,
            &args,
            &encoding,
            (width, height),
            &mut sinks,
            &progress,
        )?;
        (summary, decoder.counts(), Some(decoder.get_num_cd_suppressed()))
    } else {
        let mut decoder = Decoder::with_codecs(codecs);
        let summary = run(
            &mut decoder,
            &mut reader,
            &args,
            &encoding,
            (width, height),
            &mut sinks,
            &progress,
        )?;
        (summary, decoder.counts(), None)
    };
    sinks.finish()?;

    let total_duration = start_time.elapsed();
    progress.finish_with_message(format!(
        "Done! Decoded {} events in {:.2}s",
        counts.cd_total(),
        total_duration.as_secs_f64()
    ));

    if !args.quiet {
        let events_per_sec = counts.cd_total() as f64 / total_duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Encoding:     {}", encoding);
        eprintln!("  Sensor:       {}x{}", width, height);
        eprintln!("  Packets:      {}", summary.packets);
        if args.frame_interval.is_some() {
            eprintln!("  Frames:       {}", summary.frames);
        }
        eprintln!("  CD ON:        {}", counts.cd_on);
        eprintln!("  CD OFF:       {}", counts.cd_off);
        eprintln!("  Trig rising:  {}", counts.trigger_rising);
        eprintln!("  Trig falling: {}", counts.trigger_falling);
        if let Some(suppressed) = suppressed {
            eprintln!("  Suppressed:   {}", suppressed);
        }
        if let Some(path) = &args.output {
            eprintln!("  Output:       {:?} ({} events)", path, summary.written_cd);
        }
        if let Some(path) = &args.triggers {
            eprintln!("  Triggers:     {:?} ({} events)", path, summary.written_triggers);
        }
        if summary.faults > 0 {
            eprintln!("  Faults:       {}", summary.faults);
        }
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
        eprintln!("  Throughput:   {:.0} events/s", events_per_sec);
    }

    Ok(())
}
