//! Start/end timestamps for budgeted accumulation.
//!
//! `Gpu` records into a two-entry timestamp query set and reads the resolved
//! ticks back through a mappable buffer. `Host` waits for the queue to drain
//! and reads the host clock instead, for adapters without encoder timestamps.

use std::sync::mpsc;
use std::time::Instant;

use frame_scheduler::TimestampMarker;

const START_QUERY: u32 = 0;
const END_QUERY: u32 = 1;
const QUERY_COUNT: u32 = 2;
const RESOLVE_BYTES: u64 = 16;

pub fn gpu_timestamp_features() -> wgpu::Features {
    wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS
}

pub enum FrameTimestamps {
    Gpu(GpuTimestamps),
    Host(HostTimestamps),
}

impl FrameTimestamps {
    /// Picks the GPU path when the device was created with
    /// [`gpu_timestamp_features`], the host clock otherwise.
    pub fn for_device(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        if device.features().contains(gpu_timestamp_features()) {
            Self::Gpu(GpuTimestamps::new(device, queue))
        } else {
            log::warn!(
                target: "renderer",
                "gpu timestamp queries unavailable, accumulation budget uses the host clock"
            );
            Self::Host(HostTimestamps::default())
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu(_))
    }

    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, marker: TimestampMarker) {
        match self {
            Self::Gpu(gpu) => gpu.write(device, queue, marker),
            Self::Host(host) => host.write(device, marker),
        }
    }

    pub fn read_ns(&mut self, device: &wgpu::Device, marker: TimestampMarker) -> Option<u64> {
        match self {
            Self::Gpu(gpu) => gpu.read_ns(device, marker),
            Self::Host(host) => host.read_ns(marker),
        }
    }
}

enum ReadbackState {
    Idle,
    Submitted,
    Mapping {
        receiver: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    },
    Ready {
        start_ns: u64,
        end_ns: u64,
    },
}

pub struct GpuTimestamps {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    timestamp_period_ns: f64,
    readback: ReadbackState,
}

impl GpuTimestamps {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("renderer.accumulate_timing.query_set"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.accumulate_timing.resolve"),
            size: RESOLVE_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.accumulate_timing.readback"),
            size: RESOLVE_BYTES,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            query_set,
            resolve_buffer,
            readback_buffer,
            timestamp_period_ns: f64::from(queue.get_timestamp_period()),
            readback: ReadbackState::Idle,
        }
    }

    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, marker: TimestampMarker) {
        // A readback abandoned by a timed-out call may still hold a pending map.
        if matches!(self.readback, ReadbackState::Mapping { .. }) {
            self.readback_buffer.unmap();
        }
        self.readback = ReadbackState::Idle;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("renderer.accumulate_timing.write"),
        });
        match marker {
            TimestampMarker::Start => {
                encoder.write_timestamp(&self.query_set, START_QUERY);
            }
            TimestampMarker::End => {
                encoder.write_timestamp(&self.query_set, END_QUERY);
                encoder.resolve_query_set(
                    &self.query_set,
                    START_QUERY..QUERY_COUNT,
                    &self.resolve_buffer,
                    0,
                );
                encoder.copy_buffer_to_buffer(
                    &self.resolve_buffer,
                    0,
                    &self.readback_buffer,
                    0,
                    RESOLVE_BYTES,
                );
                self.readback = ReadbackState::Submitted;
            }
        }
        queue.submit(Some(encoder.finish()));
    }

    fn read_ns(&mut self, device: &wgpu::Device, marker: TimestampMarker) -> Option<u64> {
        self.advance_readback(device);
        match self.readback {
            ReadbackState::Ready { start_ns, end_ns } => Some(match marker {
                TimestampMarker::Start => start_ns,
                TimestampMarker::End => end_ns,
            }),
            _ => None,
        }
    }

    fn advance_readback(&mut self, device: &wgpu::Device) {
        if matches!(self.readback, ReadbackState::Idle | ReadbackState::Ready { .. }) {
            return;
        }
        if matches!(self.readback, ReadbackState::Submitted) {
            let (sender, receiver) = mpsc::channel();
            self.readback_buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = sender.send(result);
                });
            self.readback = ReadbackState::Mapping { receiver };
        }
        let _ = device.poll(wgpu::PollType::Poll);

        let ReadbackState::Mapping { receiver } =
            std::mem::replace(&mut self.readback, ReadbackState::Idle)
        else {
            return;
        };
        self.readback = match receiver.try_recv() {
            Ok(Ok(())) => {
                let mapped = self.readback_buffer.slice(..).get_mapped_range();
                let ticks: &[u64] = bytemuck::cast_slice(&mapped);
                let start_ns = ticks_to_ns(ticks[0], self.timestamp_period_ns);
                let end_ns = ticks_to_ns(ticks[1], self.timestamp_period_ns);
                drop(mapped);
                self.readback_buffer.unmap();
                ReadbackState::Ready { start_ns, end_ns }
            }
            Ok(Err(error)) => {
                log::warn!(target: "renderer", "timestamp readback map failed: {error}");
                ReadbackState::Idle
            }
            Err(mpsc::TryRecvError::Empty) => ReadbackState::Mapping { receiver },
            Err(mpsc::TryRecvError::Disconnected) => ReadbackState::Idle,
        };
    }
}

fn ticks_to_ns(ticks: u64, timestamp_period_ns: f64) -> u64 {
    (ticks as f64 * timestamp_period_ns).round() as u64
}

#[derive(Default)]
pub struct HostTimestamps {
    origin: Option<Instant>,
    start_ns: Option<u64>,
    end_ns: Option<u64>,
}

impl HostTimestamps {
    fn write(&mut self, device: &wgpu::Device, marker: TimestampMarker) {
        let _ = device.poll(wgpu::PollType::wait_indefinitely());
        let now = Instant::now();
        match marker {
            TimestampMarker::Start => {
                self.origin = Some(now);
                self.start_ns = Some(0);
                self.end_ns = None;
            }
            TimestampMarker::End => {
                let origin = *self.origin.get_or_insert(now);
                let elapsed = now.duration_since(origin).as_nanos();
                self.end_ns = Some(u64::try_from(elapsed).unwrap_or(u64::MAX));
            }
        }
    }

    fn read_ns(&self, marker: TimestampMarker) -> Option<u64> {
        match marker {
            TimestampMarker::Start => self.start_ns,
            TimestampMarker::End => self.end_ns,
        }
    }
}
