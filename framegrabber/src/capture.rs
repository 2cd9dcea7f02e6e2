/*!
Live wire word capture over UDP.

The link front end forwards recovered wire words as UDP datagrams. Two
threads handle them:

1. UDP receiver thread: datagrams -> bounded channel
2. Grabber thread: channel -> word reassembly -> grabber clock ticks ->
   acknowledged ROI sums -> result sink

Every received word is one grabber clock cycle. Datagrams may split words;
the reassembly buffer keeps the stream aligned across them. A datagram
dropped on a full channel loses its words, and the partial word left in the
buffer is discarded when the next datagram arrives. Byte alignment therefore
recovers as long as the sender starts each datagram on a word boundary.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use anyhow::{anyhow, Context, Result};
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tracing::{info, warn, error};
use crossbeam_channel::{bounded, Receiver, Sender};
use cameralink::stream::{StreamFormat, WordAssembler};
use cameralink::AckConsumer;
use crate::config::{CaptureConfig, GrabberConfig};
use crate::output::ResultSink;

/// One received UDP payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub data: Vec<u8>,
    /// At least one datagram was dropped just before this one
    pub after_drop: bool,
}

/// Totals reported when the grabber thread stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub packets: u64,
    pub words: u64,
    pub bad_words: u64,
    /// Partial-word bytes discarded after a dropped datagram
    pub discarded_bytes: u64,
    pub completions: u64,
}

/// UDP word capture feeding a grabber
pub struct WordCapture {
    capture: CaptureConfig,
    grabber: GrabberConfig,
    running: Arc<AtomicBool>,
}

impl WordCapture {
    pub fn new(capture: CaptureConfig, grabber: GrabberConfig) -> Self {
        Self {
            capture,
            grabber,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Start capturing until the running flag is cleared
    pub fn start(&mut self) -> Result<CaptureStats> {
        // Validate the grabber before binding anything
        self.grabber.build()?;

        let (data_tx, data_rx) = bounded::<Datagram>(self.capture.channel_buffer_size.max(1));

        let running_udp = Arc::clone(&self.running);
        let running_grabber = Arc::clone(&self.running);
        let bind_addr = self.capture.udp_bind_addr.clone();
        let port = self.capture.udp_port;
        let capture = self.capture.clone();
        let grabber = self.grabber.clone();

        let udp_handle = thread::spawn(move || -> Result<()> {
            let rt = Runtime::new().context("Failed to start tokio runtime")?;
            rt.block_on(async {
                match Self::udp_receiver_thread(bind_addr, port, data_tx, running_udp).await {
                    Ok(_) => {
                        info!("UDP receiver thread finished successfully");
                        Ok(())
                    }
                    Err(e) => {
                        error!("UDP receiver thread failed: {:#}", e);
                        Err(e)
                    }
                }
            })
        });

        let grabber_handle = thread::spawn(move || -> Result<CaptureStats> {
            let mut sink = ResultSink::new(grabber.names(), true);
            if capture.enable_storage {
                sink = sink.with_session_dir(&capture.output_directory)?;
            }
            let stats_interval = Duration::from_secs(capture.stats_interval_seconds.max(1));
            let result = Self::grabber_thread(
                &grabber,
                capture.stream_format,
                data_rx,
                running_grabber,
                &mut sink,
                stats_interval,
            );
            if let Err(e) = &result {
                error!("Grabber thread failed: {:#}", e);
            }
            result
        });

        let udp_result = udp_handle.join().map_err(|_| anyhow!("UDP thread panicked"))?;
        let grabber_result = grabber_handle.join().map_err(|_| anyhow!("Grabber thread panicked"))?;

        udp_result?;
        grabber_result
    }

    /// UDP receiver thread - receives datagrams and forwards them
    async fn udp_receiver_thread(
        bind_addr: String,
        port: u16,
        data_tx: Sender<Datagram>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let socket_addr = format!("{}:{}", bind_addr, port);
        info!("🔌 Binding UDP socket to {}", socket_addr);

        let socket = UdpSocket::bind(&socket_addr)
            .await
            .with_context(|| format!("Failed to bind {}", socket_addr))?;
        info!("✅ UDP socket bound successfully");

        let sock_ref = socket2::SockRef::from(&socket);
        sock_ref.set_recv_buffer_size(1024 * 1024)?;
        info!("📊 Socket receive buffer set to 1MB");

        let mut buffer = vec![0u8; 65536];
        let mut total_bytes = 0u64;
        let mut packet_count = 0u64;
        let mut dropped = 0u64;
        let mut after_drop = false;
        let start_time = Instant::now();

        while running.load(Ordering::SeqCst) {
            // Time out to check the running flag periodically
            let timeout = Duration::from_millis(100);

            match tokio::time::timeout(timeout, socket.recv(&mut buffer)).await {
                Ok(Ok(bytes_received)) => {
                    if bytes_received == 0 {
                        continue;
                    }
                    total_bytes += bytes_received as u64;
                    packet_count += 1;

                    let datagram = Datagram {
                        data: buffer[..bytes_received].to_vec(),
                        after_drop,
                    };
                    match data_tx.try_send(datagram) {
                        Ok(()) => after_drop = false,
                        Err(_) => {
                            error!("Data channel full, dropping datagram! The grabber thread can't keep up.");
                            dropped += 1;
                            after_drop = true;
                        }
                    }
                }
                Ok(Err(e)) => {
                    error!("UDP receive error: {}", e);
                }
                Err(_) => continue,
            }
        }

        let elapsed = start_time.elapsed();
        let rate_mbps = (total_bytes as f64 * 8.0) / (elapsed.as_secs_f64() * 1_000_000.0);
        info!("📈 UDP receiver final stats:");
        info!("   Datagrams: {}", packet_count);
        info!("   Bytes: {:.1} MB", total_bytes as f64 / 1_000_000.0);
        info!("   Rate: {:.2} Mbps", rate_mbps);
        info!("   Dropped: {}", dropped);
        info!("   Duration: {:.1}s", elapsed.as_secs_f64());

        Ok(())
    }

    /// Grabber thread - one clock tick per received word
    fn grabber_thread(
        grabber_config: &GrabberConfig,
        format: StreamFormat,
        data_rx: Receiver<Datagram>,
        running: Arc<AtomicBool>,
        sink: &mut ResultSink,
        stats_interval: Duration,
    ) -> Result<CaptureStats> {
        let mut grabber = grabber_config.build()?;
        let mut consumer = AckConsumer::new(grabber.len());
        let mut assembler = WordAssembler::new(format);
        let mut stats = CaptureStats::default();
        let mut last_report = Instant::now();

        info!("📝 Grabber thread started ({} ROI engines, {} stream)", grabber.len(), format);

        while running.load(Ordering::SeqCst) || !data_rx.is_empty() {
            match data_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(packet) => {
                    stats.packets += 1;
                    if packet.after_drop {
                        let discarded = assembler.clear();
                        if discarded > 0 {
                            warn!("⚠️ Datagram lost, discarding {} bytes of a partial word", discarded);
                            stats.discarded_bytes += discarded as u64;
                        }
                    }
                    assembler.push(&packet.data);

                    while let Some(word) = assembler.next_word() {
                        match word {
                            Ok(word) => {
                                let completed = consumer.tick(&mut grabber, word)?;
                                stats.completions += completed.len() as u64;
                                sink.write(&completed)?;
                                stats.words += 1;
                            }
                            Err(e) => {
                                stats.bad_words += 1;
                                if stats.bad_words == 1 || stats.bad_words % 1000 == 0 {
                                    warn!("⚠️ Skipping malformed word ({} so far): {}", stats.bad_words, e);
                                }
                            }
                        }
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    info!("Data channel disconnected - UDP receiver has stopped");
                    break;
                }
            }

            if last_report.elapsed() >= stats_interval {
                info!(
                    "📊 {} words, {} results, {} malformed words",
                    stats.words, stats.completions, stats.bad_words
                );
                last_report = Instant::now();
            }
        }

        // Let results of the last frame strobe
        let completed = consumer.flush(&mut grabber)?;
        stats.completions += completed.len() as u64;
        sink.write(&completed)?;
        sink.finish()?;
        if let Some(dir) = sink.session_dir() {
            info!("💾 Results stored in {}", dir.display());
        }

        if assembler.pending() > 0 {
            warn!("⚠️ Incomplete word at shutdown: {} bytes", assembler.pending());
        }

        info!("📊 Grabber final stats:");
        info!("   Datagrams: {}", stats.packets);
        info!("   Words (cycles): {}", stats.words);
        info!("   Malformed words: {}", stats.bad_words);
        info!("   Discarded partial-word bytes: {}", stats.discarded_bytes);
        info!("   ROI results: {}", stats.completions);

        Ok(stats)
    }
}
