//! Audio processing thread for the sample-accurate recorder
//!
//! Runs on a dedicated OS thread and shares nothing with the caller: commands
//! and raw sample blocks come in over crossbeam channels, mixed buffers go
//! out over another. Blocks are dropped before `Start` and while paused.
//!
//! Every command first consumes the blocks already queued under the state in
//! effect, then applies. `Processor::send` returns once that has happened, so
//! blocks delivered after it see the new state.

use std::collections::VecDeque;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, RecvError, Select, Sender};

use crate::error::{CaptureError, Result, SourceKind};

use super::platform::AudioBlock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    /// Gain applied to blocks of this source from now on
    SetGain(SourceKind, f32),
    /// Flush what is queued, report the frame count and exit
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Mixed samples, one `Vec` per output channel
    Buffer(Vec<Vec<f32>>),
    Finished { frames: u64 },
}

/// One raw sample feed
pub struct Input {
    pub source: SourceKind,
    pub blocks: Receiver<AudioBlock>,
}

struct Envelope {
    command: Command,
    applied: Sender<()>,
}

/// Handle to a running processor thread
pub struct Processor {
    commands: Sender<Envelope>,
    thread: Option<JoinHandle<()>>,
}

impl Processor {
    /// Start the thread. Mixed output arrives on the returned receiver.
    pub fn spawn(inputs: Vec<Input>, channels: u16) -> Result<(Self, Receiver<Output>)> {
        let channels = usize::from(channels.clamp(1, 2));
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (output_tx, output) = crossbeam_channel::unbounded();

        let state = Mixer::new(inputs, channels, output_tx);
        let thread = std::thread::Builder::new()
            .name("capturekit-audio".to_string())
            .spawn(move || state.run(command_rx))?;
        log::debug!("Audio processor started with {} channel(s)", channels);

        Ok((
            Self {
                commands,
                thread: Some(thread),
            },
            output,
        ))
    }

    /// Deliver a command and wait until the thread has applied it
    pub fn send(&self, command: Command) -> Result<()> {
        let exited = || CaptureError::platform("audio processor has exited");
        let (applied, done) = crossbeam_channel::bounded(1);
        self.commands
            .send(Envelope { command, applied })
            .map_err(|_| exited())?;
        done.recv().map_err(|_| exited())
    }

    /// Wait for the thread to exit
    pub fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| CaptureError::platform("audio processor panicked")),
            None => Ok(()),
        }
    }
}

struct Feed {
    source: SourceKind,
    blocks: Receiver<AudioBlock>,
    /// Pending samples per output channel, gain already applied
    queue: Vec<VecDeque<f32>>,
    gain: f32,
    open: bool,
}

impl Feed {
    fn queued(&self) -> usize {
        self.queue.first().map_or(0, VecDeque::len)
    }
}

enum Event {
    Command(std::result::Result<Envelope, RecvError>),
    Block(usize, std::result::Result<AudioBlock, RecvError>),
}

struct Mixer {
    feeds: Vec<Feed>,
    channels: usize,
    started: bool,
    paused: bool,
    frames: u64,
    output: Sender<Output>,
}

impl Mixer {
    fn new(inputs: Vec<Input>, channels: usize, output: Sender<Output>) -> Self {
        let feeds = inputs
            .into_iter()
            .map(|input| Feed {
                source: input.source,
                blocks: input.blocks,
                queue: vec![VecDeque::new(); channels],
                gain: 1.0,
                open: true,
            })
            .collect();
        Self {
            feeds,
            channels,
            started: false,
            paused: false,
            frames: 0,
            output,
        }
    }

    fn run(mut self, commands: Receiver<Envelope>) {
        let mut last_ack = None;
        loop {
            match self.next_event(&commands) {
                Event::Command(Ok(envelope)) => {
                    self.drain_inputs();
                    if envelope.command == Command::Stop {
                        last_ack = Some(envelope.applied);
                        break;
                    }
                    self.apply(envelope.command);
                    let _ = envelope.applied.send(());
                }
                Event::Command(Err(_)) => break,
                Event::Block(index, Ok(block)) => self.accept(index, block),
                Event::Block(index, Err(_)) => {
                    log::debug!("{} feed closed", self.feeds[index].source);
                    self.feeds[index].open = false;
                    self.mix_ready();
                }
            }
        }
        self.drain_inputs();
        self.flush();
        if let Some(ack) = last_ack {
            let _ = ack.send(());
        }
    }

    fn next_event(&self, commands: &Receiver<Envelope>) -> Event {
        let feeds: Vec<(usize, Receiver<AudioBlock>)> = self
            .feeds
            .iter()
            .enumerate()
            .filter(|(_, f)| f.open)
            .map(|(i, f)| (i, f.blocks.clone()))
            .collect();

        let mut select = Select::new();
        let command_op = select.recv(commands);
        for (_, blocks) in &feeds {
            select.recv(blocks);
        }
        let op = select.select();
        let index = op.index();
        if index == command_op {
            Event::Command(op.recv(commands))
        } else {
            let (feed, blocks) = &feeds[index - 1];
            Event::Block(*feed, op.recv(blocks))
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Start => self.started = true,
            Command::Pause => self.paused = true,
            Command::Resume => self.paused = false,
            Command::SetGain(source, gain) => {
                for feed in self.feeds.iter_mut().filter(|f| f.source == source) {
                    feed.gain = gain;
                }
            }
            Command::Stop => {}
        }
        log::trace!("Audio processor applied {:?}", command);
    }

    fn accept(&mut self, index: usize, block: AudioBlock) {
        if !self.started || self.paused {
            return;
        }
        let channels = self.channels;
        let feed = &mut self.feeds[index];
        let gain = feed.gain;
        for (queue, samples) in feed.queue.iter_mut().zip(convert(block, channels)) {
            queue.extend(samples.into_iter().map(|s| s * gain));
        }
        self.mix_ready();
    }

    /// Consume every block already queued, under the current state
    fn drain_inputs(&mut self) {
        for index in 0..self.feeds.len() {
            let pending: Vec<AudioBlock> = self.feeds[index].blocks.try_iter().collect();
            for block in pending {
                self.accept(index, block);
            }
        }
    }

    /// Mix as many frames as every open feed can supply
    fn mix_ready(&mut self) {
        let open = self.feeds.iter().filter(|f| f.open).map(Feed::queued).min();
        let frames = match open {
            Some(frames) => frames,
            None => self.feeds.iter().map(Feed::queued).max().unwrap_or(0),
        };
        self.emit(frames);
    }

    fn flush(&mut self) {
        let frames = self.feeds.iter().map(Feed::queued).max().unwrap_or(0);
        self.emit(frames);
        log::debug!("Audio processor finished after {} frames", self.frames);
        let _ = self.output.send(Output::Finished { frames: self.frames });
    }

    /// Sum `frames` frames from every feed, padding short feeds with silence
    fn emit(&mut self, frames: usize) {
        if frames == 0 {
            return;
        }
        let mut mixed = vec![vec![0.0f32; frames]; self.channels];
        for feed in &mut self.feeds {
            for (out, queue) in mixed.iter_mut().zip(feed.queue.iter_mut()) {
                let take = frames.min(queue.len());
                for (sample, value) in out.iter_mut().zip(queue.drain(..take)) {
                    *sample += value;
                }
            }
        }
        for channel in &mut mixed {
            for sample in channel.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }
        }
        self.frames += frames as u64;
        let _ = self.output.send(Output::Buffer(mixed));
    }
}

/// Map a block onto `channels` output channels
fn convert(block: AudioBlock, channels: usize) -> Vec<Vec<f32>> {
    let frames = block.frames();
    let mut input: Vec<Vec<f32>> = block
        .channels
        .into_iter()
        .map(|mut c| {
            c.truncate(frames);
            c
        })
        .collect();

    match (input.len(), channels) {
        (0, _) => vec![Vec::new(); channels],
        (n, c) if n == c => input,
        (1, c) => vec![input.remove(0); c],
        (n, 1) => {
            let scale = 1.0 / n as f32;
            let mono = (0..frames)
                .map(|i| input.iter().map(|ch| ch[i]).sum::<f32>() * scale)
                .collect();
            vec![mono]
        }
        (n, c) => (0..c).map(|i| input[i.min(n - 1)].clone()).collect(),
    }
}
