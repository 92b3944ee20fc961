//! Per-tab session state: which log is open, which window of it is loaded,
//! and the log-control operations around it. All state lives here for the
//! page's lifetime; nothing is persisted.

use crate::chunk::{self, ChunkData};
use crate::device::DeviceApi;
use crate::error::DeviceError;
use crate::ui::UiHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct Session {
    device: Arc<dyn DeviceApi>,
    ui: UiHandle,
    pub log_name: String,
    pub offset: u64,
    pub limit: u64,
    pub last_count: usize,
    pub logging: bool,
    pub current_file: String,
}

impl Session {
    pub fn new(device: Arc<dyn DeviceApi>, ui: UiHandle, log_name: String, limit: u64) -> Self {
        Self {
            device,
            ui,
            log_name,
            offset: 0,
            limit,
            last_count: 0,
            logging: false,
            current_file: String::new(),
        }
    }

    /// Fetches and decodes the current window. Updates `last_count` so the
    /// prev/next affordances stay correct, reports the window metadata on the
    /// status line, and hands the decoded chunk to the charting consumer.
    /// A failed fetch becomes an error status and `None`; decode itself
    /// cannot fail.
    pub async fn load_chunk(&mut self) -> Option<ChunkData> {
        let text = match self
            .device
            .fetch_chunk(&self.log_name, self.offset, self.limit)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                self.ui.error(format!("chunk error ({})", err.status_code()));
                return None;
            }
        };

        let parsed = chunk::parse_chunk(&text);
        self.last_count = parsed.sample_count;
        self.ui.status(format!(
            "file={} offset={} count={}",
            self.log_name, self.offset, self.last_count
        ));
        Some(parsed)
    }

    pub async fn next_chunk(&mut self) -> Option<ChunkData> {
        self.offset += self.limit;
        self.load_chunk().await
    }

    /// No-op on the first window; otherwise steps back one window, clamping
    /// at the start of the file.
    pub async fn prev_chunk(&mut self) -> Option<ChunkData> {
        if self.offset == 0 {
            return None;
        }
        self.offset = self.offset.saturating_sub(self.limit);
        self.load_chunk().await
    }

    pub fn can_prev(&self) -> bool {
        self.offset > 0
    }

    /// A full window suggests more data follows; a short one means we hit
    /// the end of the file.
    pub fn can_next(&self) -> bool {
        self.last_count as u64 >= self.limit
    }

    pub async fn refresh_status(&mut self) {
        match self.device.status().await {
            Ok(reply) => {
                self.logging = reply.logging;
                self.current_file = reply.file;
                self.ui.status(format!(
                    "logging={} file={}",
                    self.logging as u8, self.current_file
                ));
            }
            Err(err) if err.is_parse() => self.ui.error("status parse error"),
            Err(err) => self
                .ui
                .error(format!("status error ({})", err.status_code())),
        }
    }

    pub async fn refresh_logs(&self) {
        match self.device.list_logs().await {
            Ok(files) => self.ui.logs(files),
            Err(err) if err.is_parse() => self.ui.error("list parse error"),
            Err(err) => self.ui.error(format!("list error ({})", err.status_code())),
        }
    }

    pub async fn start_logging(&mut self) {
        match self.device.start_logging().await {
            Ok(reply) => {
                self.logging = reply.logging;
                self.current_file = reply.file;
                if self.logging {
                    self.ui
                        .status(format!("Logging started: {}", self.current_file));
                } else {
                    self.ui.error("Start requested, but logging is still OFF");
                }
            }
            Err(err) if err.is_parse() => self.ui.error("start parse error"),
            Err(err) => self.ui.error(format!("start error ({})", err.status_code())),
        }
        self.refresh_logs().await;
    }

    pub async fn stop_logging(&mut self) {
        match self.device.stop_logging().await {
            Ok(reply) => {
                self.logging = reply.logging;
                self.current_file = reply.file;
                if self.logging {
                    self.ui.error(format!(
                        "Stop requested, but logging is still ON ({})",
                        self.current_file
                    ));
                } else {
                    self.ui.status("Logging stopped");
                }
            }
            Err(err) if err.is_parse() => self.ui.error("stop parse error"),
            Err(err) => self.ui.error(format!("stop error ({})", err.status_code())),
        }
        self.refresh_logs().await;
    }

    pub async fn delete_log(&self, name: &str) {
        match self.device.delete_log(name).await {
            Ok(()) => {
                self.ui.status(format!("Deleted: {name}"));
                self.refresh_logs().await;
            }
            Err(err) => self
                .ui
                .error(format!("delete error ({})", err.status_code())),
        }
    }
}

/// Recurring fire-and-forget read of the device's live averages. Each tick is
/// independent of the previous one, so no overlap guard is needed; failed or
/// not-ok reads are skipped silently and the next tick tries again.
pub fn spawn_live_poll(
    device: Arc<dyn DeviceApi>,
    ui: UiHandle,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match device.read_live().await {
                Ok(reading) if reading.ok => ui.live(reading),
                Ok(_) => {}
                Err(DeviceError::Transport(err)) => {
                    tracing::debug!("live read failed: {err}");
                }
                Err(_) => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{LiveReading, SetReply, StatusReply};
    use crate::ui::{UiEvent, UiHandle};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    struct ScriptedDevice {
        chunk_text: StdMutex<String>,
        chunk_requests: StdMutex<Vec<(String, u64, u64)>>,
        chunk_fails: StdMutex<bool>,
        live: StdMutex<LiveReading>,
        status_reply: StdMutex<StatusReply>,
    }

    impl Default for ScriptedDevice {
        fn default() -> Self {
            Self {
                chunk_text: StdMutex::new(String::new()),
                chunk_requests: StdMutex::new(Vec::new()),
                chunk_fails: StdMutex::new(false),
                live: StdMutex::new(LiveReading::default()),
                status_reply: StdMutex::new(StatusReply::default()),
            }
        }
    }

    #[async_trait]
    impl DeviceApi for ScriptedDevice {
        async fn fetch_chunk(
            &self,
            name: &str,
            offset: u64,
            limit: u64,
        ) -> Result<String, DeviceError> {
            self.chunk_requests
                .lock()
                .unwrap()
                .push((name.to_string(), offset, limit));
            if *self.chunk_fails.lock().unwrap() {
                return Err(DeviceError::Status(404));
            }
            Ok(self.chunk_text.lock().unwrap().clone())
        }

        async fn read_settings(&self) -> Result<Map<String, Value>, DeviceError> {
            Ok(Map::new())
        }

        async fn write_setting(&self, _: &str, _: &str) -> Result<SetReply, DeviceError> {
            Ok(SetReply::default())
        }

        async fn read_live(&self) -> Result<LiveReading, DeviceError> {
            Ok(self.live.lock().unwrap().clone())
        }

        async fn status(&self) -> Result<StatusReply, DeviceError> {
            Ok(self.status_reply.lock().unwrap().clone())
        }

        async fn list_logs(&self) -> Result<Vec<String>, DeviceError> {
            Ok(vec!["log1.csv".to_string()])
        }

        async fn start_logging(&self) -> Result<StatusReply, DeviceError> {
            Ok(self.status_reply.lock().unwrap().clone())
        }

        async fn stop_logging(&self) -> Result<StatusReply, DeviceError> {
            Ok(self.status_reply.lock().unwrap().clone())
        }

        async fn delete_log(&self, _: &str) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn save_settings(&self) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn reload_settings(&self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn setup(limit: u64) -> (
        Session,
        Arc<ScriptedDevice>,
        mpsc::UnboundedReceiver<UiEvent>,
    ) {
        let device = Arc::new(ScriptedDevice::default());
        let (ui, rx) = UiHandle::channel();
        let session = Session::new(device.clone(), ui, "log1.csv".to_string(), limit);
        (session, device, rx)
    }

    #[tokio::test]
    async fn load_chunk_decodes_and_tracks_count() {
        let (mut session, device, _rx) = setup(1000);
        *device.chunk_text.lock().unwrap() = "1,2,0,0,100\n3,4,0,0,200\n".to_string();

        let data = session.load_chunk().await.expect("chunk");
        assert_eq!(data.sample_count, 2);
        assert_eq!(session.last_count, 2);
        assert!(!session.can_next());
        assert!(!session.can_prev());
        assert_eq!(
            device.chunk_requests.lock().unwrap().as_slice(),
            &[("log1.csv".to_string(), 0, 1000)]
        );
    }

    #[tokio::test]
    async fn full_window_enables_next() {
        let (mut session, device, _rx) = setup(2);
        *device.chunk_text.lock().unwrap() = "1,2,0,0,100\n3,4,0,0,200\n".to_string();
        session.load_chunk().await.expect("chunk");
        assert!(session.can_next());

        session.next_chunk().await.expect("chunk");
        assert_eq!(session.offset, 2);
        assert!(session.can_prev());
    }

    #[tokio::test]
    async fn prev_is_a_noop_at_the_start() {
        let (mut session, _device, _rx) = setup(1000);
        assert!(session.prev_chunk().await.is_none());
        assert_eq!(session.offset, 0);
    }

    #[tokio::test]
    async fn prev_steps_back_and_clamps_at_zero() {
        let (mut session, device, _rx) = setup(1000);
        *device.chunk_text.lock().unwrap() = String::new();
        session.offset = 1000;
        session.prev_chunk().await.expect("chunk");
        assert_eq!(session.offset, 0);
    }

    #[tokio::test]
    async fn failed_fetch_reports_and_returns_none() {
        let (mut session, device, mut rx) = setup(1000);
        *device.chunk_fails.lock().unwrap() = true;
        assert!(session.load_chunk().await.is_none());

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if let UiEvent::Status { text, error: true } = event {
                assert_eq!(text, "chunk error (404)");
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test(start_paused = true)]
    async fn live_poll_forwards_ok_readings_only() {
        let device = Arc::new(ScriptedDevice::default());
        let (ui, mut rx) = UiHandle::channel();

        // first tick: not-ok reading, skipped
        let poll = spawn_live_poll(device.clone(), ui, Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        device.live.lock().unwrap().ok = true;
        device.live.lock().unwrap().hb_left_avg = Some(12.0);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let event = rx.try_recv().expect("live event");
        match event {
            UiEvent::Live(reading) => {
                assert!(reading.ok);
                assert_eq!(reading.hb_left_avg, Some(12.0));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        poll.abort();
    }
}
