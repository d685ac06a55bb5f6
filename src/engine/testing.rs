//! In-memory engine for tests.
//!
//! Media files are TOML descriptors ([`FakeMedia`]) instead of real streams.
//! `exec` understands the subset of ffmpeg options the pipeline emits and
//! computes the descriptor a real encode would produce: duration after
//! `-t`, looping and concatenation, stream selection via `-map`, `-an`, and
//! even-dimension scaling.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::engine::{validate_file_name, EngineEvent, MediaEngine};
use crate::error::{EngineError, Result};

/// A contiguous run of frames taken from one labelled source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub label: String,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeMedia {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub video_streams: u32,
    pub audio_streams: u32,
    pub spans: Vec<Span>,
}

impl FakeMedia {
    /// Camera-style clip: one video stream plus its own audio
    pub fn clip(label: &str, duration: f64, width: u32, height: u32) -> Self {
        Self {
            duration,
            width,
            height,
            video_streams: 1,
            audio_streams: 1,
            spans: vec![Span { label: label.to_string(), length: duration }],
        }
    }

    /// Music file, optionally with embedded cover art (a still video stream)
    pub fn song(duration: f64, cover_art: bool) -> Self {
        Self {
            duration,
            width: if cover_art { 500 } else { 0 },
            height: if cover_art { 500 } else { 0 },
            video_streams: u32::from(cover_art),
            audio_streams: 1,
            spans: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        toml::to_string(self).expect("descriptor serializes").into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        toml::from_str(std::str::from_utf8(bytes).ok()?).ok()
    }

    /// Labels in playback order with adjacent repeats merged
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for span in &self.spans {
            if labels.last() != Some(&span.label) {
                labels.push(span.label.clone());
            }
        }
        labels
    }

    /// Label showing at time `t`
    pub fn label_at(&self, t: f64) -> Option<&str> {
        let mut cursor = 0.0;
        for span in &self.spans {
            cursor += span.length;
            if t < cursor {
                return Some(&span.label);
            }
        }
        None
    }
}

#[derive(Default)]
struct Input {
    name: String,
    concat: bool,
    looped: bool,
}

#[derive(Default)]
struct Command {
    inputs: Vec<Input>,
    limit: Option<f64>,
    no_audio: bool,
    shortest: bool,
    maps: Vec<String>,
    filter: Option<String>,
    output: String,
}

/// Resolved input: descriptor plus whether it repeats forever
struct Source {
    media: FakeMedia,
    looped: bool,
}

#[derive(Default)]
struct FakeState {
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<Vec<String>>,
}

pub struct FakeEngine {
    state: Mutex<FakeState>,
    loaded: AtomicBool,
    fail_load: bool,
    fail_output: Mutex<Option<String>>,
    exec_delay: Option<Duration>,
    operations: AtomicUsize,
    events: broadcast::Sender<EngineEvent>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            state: Mutex::new(FakeState::default()),
            loaded: AtomicBool::new(false),
            fail_load: false,
            fail_output: Mutex::new(None),
            exec_delay: None,
            operations: AtomicUsize::new(0),
            events,
        }
    }

    /// Simulates an engine whose initialization cannot complete
    pub fn failing_load() -> Self {
        Self { fail_load: true, ..Self::new() }
    }

    /// Every command sleeps before finishing
    pub fn with_exec_delay(delay: Duration) -> Self {
        Self { exec_delay: Some(delay), ..Self::new() }
    }

    /// Already loaded, ready for a render
    pub async fn loaded() -> Self {
        let engine = Self::new();
        engine.load().await.expect("fake engine loads");
        engine
    }

    /// Fail any command whose output file name contains `fragment`
    pub fn fail_commands_writing(&self, fragment: &str) {
        *self.fail_output.lock().unwrap() = Some(fragment.to_string());
    }

    /// Place a file directly, bypassing the operation counter
    pub fn insert_file(&self, name: &str, bytes: Vec<u8>) {
        self.state.lock().unwrap().files.insert(name.to_string(), bytes);
    }

    pub fn file_names(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Number of engine calls made through the [`MediaEngine`] trait
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    pub fn media(&self, name: &str) -> Option<FakeMedia> {
        let state = self.state.lock().unwrap();
        FakeMedia::from_bytes(state.files.get(name)?)
    }

    fn touch(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(EngineError::NotLoaded.into())
        }
    }

    fn failure(args: &[String], diagnostics: impl Into<String>) -> EngineError {
        EngineError::ExecutionFailed {
            command: args.join(" "),
            status: "exit status: 1".to_string(),
            diagnostics: diagnostics.into(),
        }
    }

    fn parse(args: &[String]) -> std::result::Result<Command, String> {
        let (output, options) = args.split_last().ok_or("no output file")?;
        let mut command = Command { output: output.clone(), ..Command::default() };
        let mut concat_next = false;
        let mut loop_next = false;

        let mut iter = options.iter();
        while let Some(flag) = iter.next() {
            let mut value = || iter.next().cloned().ok_or(format!("missing value for {}", flag));
            match flag.as_str() {
                "-f" => concat_next = value()? == "concat",
                "-stream_loop" => loop_next = value()? == "-1",
                "-i" => {
                    command.inputs.push(Input { name: value()?, concat: concat_next, looped: loop_next });
                    concat_next = false;
                    loop_next = false;
                }
                "-t" => {
                    let limit = value()?;
                    command.limit = Some(limit.parse().map_err(|_| format!("bad duration {}", limit))?);
                }
                "-an" => command.no_audio = true,
                "-shortest" => command.shortest = true,
                "-map" => command.maps.push(value()?),
                "-vf" => command.filter = Some(value()?),
                "-safe" | "-c" | "-c:v" | "-c:a" | "-preset" | "-crf" | "-tune" | "-b:a"
                | "-movflags" | "-pix_fmt" | "-r" => {
                    value()?;
                }
                other => return Err(format!("Unrecognized option '{}'", other)),
            }
        }

        if command.inputs.is_empty() {
            return Err("no inputs".to_string());
        }
        Ok(command)
    }

    fn resolve(files: &BTreeMap<String, Vec<u8>>, input: &Input) -> std::result::Result<Source, String> {
        let load = |name: &str| {
            let bytes = files.get(name).ok_or(format!("{}: No such file or directory", name))?;
            FakeMedia::from_bytes(bytes).ok_or(format!("{}: Invalid data found when processing input", name))
        };

        if !input.concat {
            return Ok(Source { media: load(&input.name)?, looped: input.looped });
        }

        let manifest = files
            .get(&input.name)
            .ok_or(format!("{}: No such file or directory", input.name))?;
        let manifest = String::from_utf8_lossy(manifest);

        let mut combined: Option<FakeMedia> = None;
        for line in manifest.lines().filter(|l| !l.trim().is_empty()) {
            let name = line
                .trim()
                .strip_prefix("file '")
                .and_then(|rest| rest.strip_suffix('\''))
                .ok_or(format!("Line '{}': unknown keyword", line))?;
            let part = load(name).map_err(|e| format!("Impossible to open '{}': {}", name, e))?;

            combined = Some(match combined {
                None => part,
                Some(mut acc) => {
                    acc.duration += part.duration;
                    acc.spans.extend(part.spans);
                    acc
                }
            });
        }

        let media = combined.ok_or("empty concat list")?;
        Ok(Source { media, looped: input.looped })
    }

    /// Spans covering `[0, length)` of `source`, repeating it when looped
    fn take_spans(source: &Source, length: f64) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut remaining = length;
        loop {
            for span in &source.media.spans {
                if remaining <= 1e-9 {
                    return spans;
                }
                let take = span.length.min(remaining);
                spans.push(Span { label: span.label.clone(), length: take });
                remaining -= take;
            }
            if !source.looped || source.media.spans.is_empty() || remaining <= 1e-9 {
                return spans;
            }
        }
    }

    fn run(files: &BTreeMap<String, Vec<u8>>, command: &Command) -> std::result::Result<FakeMedia, String> {
        let sources = command
            .inputs
            .iter()
            .map(|input| Self::resolve(files, input))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let stream_length = |source: &Source| {
            if source.looped { f64::INFINITY } else { source.media.duration }
        };

        // (input index, stream count) per kind
        let (video, audio): (Option<(usize, u32)>, Option<(usize, u32)>) = if command.maps.is_empty() {
            let first_video = sources.iter().position(|s| s.media.video_streams > 0);
            let first_audio = sources.iter().position(|s| s.media.audio_streams > 0);
            let video_count: u32 = sources.iter().map(|s| s.media.video_streams).sum();
            let audio_count: u32 = sources.iter().map(|s| s.media.audio_streams).sum();
            (first_video.map(|i| (i, video_count)), first_audio.map(|i| (i, audio_count)))
        } else {
            let mut video = None;
            let mut audio = None;
            for map in &command.maps {
                let mut parts = map.split(':');
                let index: usize = parts
                    .next()
                    .and_then(|p| p.parse().ok())
                    .ok_or(format!("Invalid stream specifier {}", map))?;
                let source = sources.get(index).ok_or(format!("Invalid input file index: {}", index))?;
                match parts.next() {
                    Some("v") if source.media.video_streams > 0 => video = Some((index, 1)),
                    Some("a") if source.media.audio_streams > 0 => audio = Some((index, 1)),
                    _ => return Err(format!("Stream map '{}' matches no streams", map)),
                }
            }
            (video, audio)
        };
        let audio = if command.no_audio { None } else { audio };

        let video_length = video.map(|(i, _)| stream_length(&sources[i]));
        let audio_length = audio.map(|(i, _)| stream_length(&sources[i]));
        let lengths = video_length.into_iter().chain(audio_length);

        let mut duration = if command.shortest {
            lengths.fold(f64::INFINITY, f64::min)
        } else {
            lengths.fold(0.0, f64::max)
        };
        if let Some(limit) = command.limit {
            duration = duration.min(limit);
        }
        if !duration.is_finite() {
            return Err("Output would be infinite".to_string());
        }

        let (mut width, mut height, spans) = match video {
            Some((i, _)) => {
                let source = &sources[i];
                let visible = stream_length(source).min(duration);
                (source.media.width, source.media.height, Self::take_spans(source, visible))
            }
            None => (0, 0, Vec::new()),
        };

        if let Some(filter) = &command.filter {
            if let Some(size) = filter.split(',').find_map(|f| f.strip_prefix("pad=")) {
                let mut dims = size.split(':').take(2).map(|d| d.parse::<u32>());
                if let (Some(Ok(w)), Some(Ok(h))) = (dims.next(), dims.next()) {
                    width = w;
                    height = h;
                }
            } else if filter.contains("trunc(iw/2)*2") {
                width &= !1;
                height &= !1;
            }
        }

        Ok(FakeMedia {
            duration,
            width,
            height,
            video_streams: video.map(|(_, n)| n).unwrap_or(0),
            audio_streams: audio.map(|(_, n)| n).unwrap_or(0),
            spans,
        })
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn load(&self) -> Result<()> {
        self.touch();
        if self.fail_load {
            return Err(EngineError::LoadFailed { reason: "simulated network failure".to_string() }.into());
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) {
        self.touch();
        self.loaded.store(false, Ordering::SeqCst);
        self.state.lock().unwrap().files.clear();
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.touch();
        self.ensure_loaded()?;
        validate_file_name(name)?;
        self.state.lock().unwrap().files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.touch();
        self.ensure_loaded()?;
        self.state
            .lock()
            .unwrap()
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FileNotFound { name: name.to_string() }.into())
    }

    async fn file_exists(&self, name: &str) -> Result<bool> {
        self.touch();
        self.ensure_loaded()?;
        Ok(self.state.lock().unwrap().files.contains_key(name))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.touch();
        self.state.lock().unwrap().files.remove(name);
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        self.touch();
        self.ensure_loaded()?;

        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }

        let command = Self::parse(args).map_err(|e| Self::failure(args, e))?;

        let fail_output = self.fail_output.lock().unwrap().clone();
        if let Some(fragment) = fail_output {
            if command.output.contains(&fragment) {
                return Err(Self::failure(args, "Conversion failed!").into());
            }
        }

        let result = {
            let mut state = self.state.lock().unwrap();
            state.commands.push(args.to_vec());
            Self::run(&state.files, &command).map(|media| {
                state.files.insert(command.output.clone(), media.to_bytes());
                media
            })
        };
        let media = result.map_err(|e| Self::failure(args, e))?;

        let _ = self.events.send(EngineEvent::Log("frame=  120 fps=0.0 q=-1.0".to_string()));
        let _ = self.events.send(EngineEvent::Log(format!("Output #0, mp4, to '{}'", command.output)));
        for step in 1..=4u64 {
            let elapsed_us = (media.duration * 1_000_000.0) as u64 * step / 4;
            let _ = self.events.send(EngineEvent::Progress { elapsed_us });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_stream_loop_and_trim() {
        let engine = FakeEngine::loaded().await;
        engine.insert_file("a.mp4", FakeMedia::clip("A", 4.0, 641, 361).to_bytes());

        engine
            .exec(&args(&["-stream_loop", "-1", "-i", "a.mp4", "-t", "10", "-an", "-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2", "out.mp4"]))
            .await
            .unwrap();

        let out = engine.media("out.mp4").unwrap();
        assert_eq!(out.duration, 10.0);
        assert_eq!((out.width, out.height), (640, 360));
        assert_eq!(out.audio_streams, 0);
        assert_eq!(out.spans.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let engine = FakeEngine::loaded().await;
        let result = engine.exec(&args(&["-i", "missing.mp4", "out.mp4"])).await;

        assert!(matches!(
            result,
            Err(crate::error::StitchError::Engine(EngineError::ExecutionFailed { .. }))
        ));
        assert!(engine.media("out.mp4").is_none());
    }

    #[tokio::test]
    async fn test_unmapped_cover_art_leaks() {
        let engine = FakeEngine::loaded().await;
        engine.insert_file("v.mp4", FakeMedia::clip("V", 5.0, 640, 360).to_bytes());
        engine.insert_file("a.mp3", FakeMedia::song(5.0, true).to_bytes());

        engine.exec(&args(&["-i", "v.mp4", "-i", "a.mp3", "-an", "all.mp4"])).await.unwrap();
        assert_eq!(engine.media("all.mp4").unwrap().video_streams, 2);
    }
}
