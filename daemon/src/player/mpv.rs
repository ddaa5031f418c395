use common::PortraitError;
use serde_json::{Value, json};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::{Child, Command};

use super::PlaybackEngine;
use super::protocol::{Message, encode_request, parse_message};
use crate::config::DisplayGeometry;

const CONNECT_ATTEMPTS: u32 = 50;
const PROPERTY_ATTEMPTS: u32 = 50;
const RETRY_DELAY: Duration = Duration::from_millis(100);
const LOAD_TIMEOUT: Duration = Duration::from_secs(10);
const QUIT_TIMEOUT: Duration = Duration::from_secs(3);

/// How the mpv child process is launched
#[derive(Debug, Clone)]
pub struct MpvOptions {
    pub program: String,
    pub socket_path: PathBuf,
    pub geometry: DisplayGeometry,
    /// Restart the clip when it ends instead of holding the last frame
    pub looping: bool,
}

impl MpvOptions {
    pub fn new(program: impl Into<String>, geometry: DisplayGeometry) -> Self {
        Self {
            program: program.into(),
            socket_path: default_socket_path(),
            geometry,
            looping: true,
        }
    }

    /// Command line for a borderless, initially paused window
    fn args(&self, path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--no-terminal",
            "--no-osc",
            "--no-osd-bar",
            "--osd-level=0",
            "--no-border",
            "--keep-open=yes",
            "--pause",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        if self.looping {
            args.push("--loop-file=inf".into());
        }
        args.push(format!("--geometry={}", self.geometry.to_geometry_arg()).into());

        let mut ipc = OsString::from("--input-ipc-server=");
        ipc.push(&self.socket_path);
        args.push(ipc);

        args.push(path.as_os_str().to_owned());
        args
    }
}

/// IPC socket path helper
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    PathBuf::from(runtime_dir).join(format!("living-portrait-mpv-{}.sock", std::process::id()))
}

/// Delete a player socket, ignoring one that does not exist
pub fn remove_socket(path: &Path) -> Result<(), PortraitError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Playback engine backed by an `mpv` child process
pub struct MpvEngine {
    child: Child,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    socket_path: PathBuf,
    /// Reused buffer for incoming lines
    line: String,
    next_request_id: u64,
    /// Set when mpv reports `file-loaded`, cleared before each `loadfile`
    file_loaded: bool,
    released: bool,
}

impl MpvEngine {
    /// Launch mpv on `path` and wait until the clip is ready
    pub async fn spawn(path: &Path, options: &MpvOptions) -> Result<Self, PortraitError> {
        remove_socket(&options.socket_path)?;

        log::info!("Starting {} with {}", options.program, path.display());
        let mut child = Command::new(&options.program)
            .args(options.args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PortraitError::EngineUnavailable(format!(
                    "failed to start {}: {}",
                    options.program, e
                ))
            })?;

        let stream = match connect(&options.socket_path, &mut child).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };
        log::debug!("Connected to player IPC at {}", options.socket_path.display());

        Self::attach(child, stream, options.socket_path.clone()).await
    }

    /// Take over a running player and its IPC connection
    async fn attach(
        child: Child,
        stream: UnixStream,
        socket_path: PathBuf,
    ) -> Result<Self, PortraitError> {
        let (reader, writer) = stream.into_split();
        let mut engine = Self {
            child,
            reader: BufReader::new(reader),
            writer,
            socket_path,
            line: String::new(),
            next_request_id: 0,
            file_loaded: false,
            released: false,
        };

        let duration = engine.wait_for_duration().await?;
        log::info!("Player ready ({:.1}s clip)", duration.as_secs_f64());

        Ok(engine)
    }

    /// Read the next well-formed message from the socket
    async fn read_message(&mut self) -> Result<Message, PortraitError> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .map_err(ipc_error)?;
            if read == 0 {
                return Err(PortraitError::EngineUnavailable(
                    "player closed the IPC connection".to_string(),
                ));
            }

            match parse_message(&self.line) {
                Ok(Message::Event(event)) => {
                    log::trace!("Player event: {}", event);
                    if event == "file-loaded" {
                        self.file_loaded = true;
                    }
                    return Ok(Message::Event(event));
                }
                Ok(reply) => return Ok(reply),
                Err(e) => log::warn!("{}", e),
            }
        }
    }

    /// Send a command and wait for its reply
    ///
    /// The outer error is a transport failure, the inner one mpv rejecting
    /// the command.
    async fn request(&mut self, command: &[Value]) -> Result<Result<Value, String>, PortraitError> {
        self.next_request_id += 1;
        let request_id = self.next_request_id;

        let line = encode_request(request_id, command)?;
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(ipc_error)?;
        self.writer.flush().await.map_err(ipc_error)?;

        loop {
            match self.read_message().await? {
                Message::Event(_) => {}
                Message::Reply {
                    request_id: id,
                    result,
                } if id == request_id => return Ok(result),
                Message::Reply { request_id: id, .. } => {
                    log::debug!("Ignoring stale reply to request {}", id);
                }
            }
        }
    }

    async fn command(&mut self, command: &[Value]) -> Result<Value, PortraitError> {
        self.request(command).await?.map_err(|error| {
            let name = command.first().and_then(Value::as_str).unwrap_or("command");
            PortraitError::EngineUnavailable(format!("player rejected {}: {}", name, error))
        })
    }

    async fn set_paused(&mut self, paused: bool) -> Result<(), PortraitError> {
        self.command(&[json!("set_property"), json!("pause"), json!(paused)])
            .await
            .map(|_| ())
    }

    /// Poll the clip duration until mpv has it
    async fn wait_for_duration(&mut self) -> Result<Duration, PortraitError> {
        let mut last_error = String::new();
        for _ in 0..PROPERTY_ATTEMPTS {
            match self
                .request(&[json!("get_property"), json!("duration")])
                .await?
            {
                Ok(value) => return duration_from_value(&value),
                Err(error) => {
                    last_error = error;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
        Err(PortraitError::EngineUnavailable(format!(
            "clip duration unavailable: {}",
            last_error
        )))
    }

    async fn wait_until_loaded(&mut self) -> Result<(), PortraitError> {
        let wait = async {
            while !self.file_loaded {
                self.read_message().await?;
            }
            Ok::<(), PortraitError>(())
        };
        tokio::time::timeout(LOAD_TIMEOUT, wait)
            .await
            .map_err(|_| {
                PortraitError::EngineUnavailable(format!(
                    "file not loaded after {}s",
                    LOAD_TIMEOUT.as_secs()
                ))
            })?
    }
}

impl PlaybackEngine for MpvEngine {
    async fn play(&mut self) -> Result<(), PortraitError> {
        self.set_paused(false).await
    }

    async fn pause(&mut self) -> Result<(), PortraitError> {
        self.set_paused(true).await
    }

    async fn load(&mut self, path: &Path, paused: bool) -> Result<(), PortraitError> {
        // pause is a global property, so it carries over to the next file
        self.set_paused(paused).await?;

        self.file_loaded = false;
        self.command(&[
            json!("loadfile"),
            json!(path.to_string_lossy()),
            json!("replace"),
        ])
        .await?;
        self.wait_until_loaded().await?;

        log::debug!("Loaded {}", path.display());
        Ok(())
    }

    async fn set_position(&mut self, fraction: f64) -> Result<(), PortraitError> {
        let percent = fraction.clamp(0.0, 1.0) * 100.0;
        self.command(&[json!("seek"), json!(percent), json!("absolute-percent+exact")])
            .await
            .map(|_| ())
    }

    async fn duration(&mut self) -> Result<Duration, PortraitError> {
        self.wait_for_duration().await
    }

    async fn quit(&mut self) -> Result<(), PortraitError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if let Err(e) = self.command(&[json!("quit")]).await {
            log::debug!("Quit request not acknowledged: {}", e);
        }

        match tokio::time::timeout(QUIT_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => log::info!("Player exited with {}", status),
            Ok(Err(e)) => log::warn!("Failed to wait for player: {}", e),
            Err(_) => {
                log::warn!("Player did not exit in time, killing it");
                self.child.kill().await?;
            }
        }

        remove_socket(&self.socket_path)
    }
}

/// Wait for the IPC socket of a freshly started player
async fn connect(socket_path: &Path, child: &mut Child) -> Result<UnixStream, PortraitError> {
    for _ in 0..CONNECT_ATTEMPTS {
        if let Some(status) = child.try_wait()? {
            return Err(PortraitError::EngineUnavailable(format!(
                "player exited during startup with {}",
                status
            )));
        }

        match UnixStream::connect(socket_path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => log::trace!("IPC socket not ready: {}", e),
        }
        tokio::time::sleep(RETRY_DELAY).await;
    }

    Err(PortraitError::EngineUnavailable(format!(
        "no IPC socket at {} after {} attempts",
        socket_path.display(),
        CONNECT_ATTEMPTS
    )))
}

fn duration_from_value(value: &Value) -> Result<Duration, PortraitError> {
    let secs = value.as_f64().ok_or_else(|| {
        PortraitError::EngineUnavailable(format!("unexpected duration value: {}", value))
    })?;
    Duration::try_from_secs_f64(secs).map_err(|e| {
        PortraitError::EngineUnavailable(format!("invalid clip duration {}: {}", secs, e))
    })
}

fn ipc_error(e: std::io::Error) -> PortraitError {
    PortraitError::EngineUnavailable(format!("IPC failure: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn options(program: &str, socket_path: PathBuf) -> MpvOptions {
        MpvOptions {
            program: program.to_string(),
            socket_path,
            geometry: DisplayGeometry::default(),
            looping: true,
        }
    }

    /// Stand-in for mpv's IPC server
    ///
    /// Every reply is preceded by an event and a reply to an unknown request.
    /// `duration` is unavailable for the first `duration_misses` queries and
    /// once more after each `loadfile`. Commands named `reject` fail.
    async fn scripted_player(
        listener: UnixListener,
        mut duration_misses: usize,
        reject: Option<&'static str>,
    ) -> Vec<String> {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut received = Vec::new();

        while let Some(line) = lines.next_line().await.unwrap() {
            let request: Value = serde_json::from_str(&line).unwrap();
            let id = request["request_id"].as_u64().unwrap();
            let name = request["command"][0].as_str().unwrap().to_string();

            let reply = if reject == Some(name.as_str()) {
                json!({ "request_id": id, "error": "invalid parameter" })
            } else if name == "get_property" && duration_misses > 0 {
                duration_misses -= 1;
                json!({ "request_id": id, "error": "property unavailable" })
            } else if name == "get_property" {
                json!({ "request_id": id, "error": "success", "data": 2.5 })
            } else {
                json!({ "request_id": id, "error": "success", "data": null })
            };

            let mut out = String::from("{\"event\":\"playback-restart\"}\n");
            out.push_str("{\"request_id\":999,\"error\":\"success\",\"data\":null}\n");
            out.push_str(&format!("{}\n", reply));
            if name == "loadfile" {
                out.push_str("{\"event\":\"file-loaded\"}\n");
                duration_misses = 1;
            }
            writer.write_all(out.as_bytes()).await.unwrap();

            received.push(name.clone());
            if name == "quit" {
                break;
            }
        }
        received
    }

    /// Engine connected to a scripted player on a fresh socket
    async fn attached_engine(
        dir: &Path,
        duration_misses: usize,
        reject: Option<&'static str>,
    ) -> (MpvEngine, tokio::task::JoinHandle<Vec<String>>) {
        let socket_path = dir.join("mpv.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let peer = tokio::spawn(scripted_player(listener, duration_misses, reject));

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let child = Command::new("true").kill_on_drop(true).spawn().unwrap();
        let engine = MpvEngine::attach(child, stream, socket_path).await.unwrap();
        (engine, peer)
    }

    #[test]
    fn test_player_args() {
        let options = options("mpv", PathBuf::from("/tmp/portrait.sock"));
        let args = options.args(Path::new("ghost.mp4"));

        assert!(args.contains(&OsString::from("--pause")));
        assert!(args.contains(&OsString::from("--loop-file=inf")));
        assert!(args.contains(&OsString::from("--geometry=1920x1080+0+0")));
        assert!(args.contains(&OsString::from("--input-ipc-server=/tmp/portrait.sock")));
        assert_eq!(args.last(), Some(&OsString::from("ghost.mp4")));
    }

    #[test]
    fn test_player_args_without_looping() {
        let mut options = options("mpv", PathBuf::from("/tmp/portrait.sock"));
        options.looping = false;
        let args = options.args(Path::new("ghost.mp4"));

        assert!(!args.iter().any(|arg| arg.to_string_lossy().starts_with("--loop")));
        assert!(args.contains(&OsString::from("--keep-open=yes")));
    }

    #[test]
    fn test_new_options_loop_by_default() {
        assert!(MpvOptions::new("mpv", DisplayGeometry::default()).looping);
    }

    #[test]
    fn test_duration_from_value() {
        assert_eq!(
            duration_from_value(&json!(12.5)).unwrap(),
            Duration::from_millis(12_500)
        );
        assert_eq!(duration_from_value(&json!(3)).unwrap(), Duration::from_secs(3));
        assert!(duration_from_value(&json!(-1.0)).is_err());
        assert!(duration_from_value(&Value::Null).is_err());
        assert!(duration_from_value(&json!("long")).is_err());
    }

    #[test]
    fn test_socket_path() {
        let path = default_socket_path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("living-portrait-mpv-"));
        assert!(name.ends_with(".sock"));
    }

    #[test]
    fn test_remove_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"").unwrap();

        remove_socket(&path).unwrap();
        assert!(!path.exists());
        // Already gone
        remove_socket(&path).unwrap();
    }

    #[tokio::test]
    async fn test_spawn_missing_player() {
        let options = options(
            "living-portrait-no-such-player",
            std::env::temp_dir().join("living-portrait-missing.sock"),
        );
        let result = MpvEngine::spawn(Path::new("ghost.mp4"), &options).await;
        assert!(matches!(result, Err(PortraitError::EngineUnavailable(_))));
    }

    #[tokio::test]
    async fn test_session_against_scripted_player() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("mpv.sock");
        let (mut engine, peer) = attached_engine(dir.path(), 2, None).await;

        engine.pause().await.unwrap();
        engine.set_position(0.0).await.unwrap();

        engine.load(Path::new("/videos/b.mp4"), true).await.unwrap();
        assert!(engine.file_loaded);

        assert_eq!(engine.duration().await.unwrap(), Duration::from_millis(2500));

        engine.quit().await.unwrap();
        assert!(!socket_path.exists());
        // Releasing twice is a no-op
        engine.quit().await.unwrap();

        let received = peer.await.unwrap();
        assert_eq!(
            received,
            [
                "get_property",
                "get_property",
                "get_property",
                "set_property",
                "seek",
                "set_property",
                "loadfile",
                "get_property",
                "get_property",
                "quit",
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_command_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _peer) = attached_engine(dir.path(), 0, Some("seek")).await;

        let err = engine.set_position(0.0).await.unwrap_err();
        assert!(
            matches!(err, PortraitError::EngineUnavailable(ref msg) if msg.contains("seek") && msg.contains("invalid parameter"))
        );

        // The connection stays usable after a rejection
        engine.pause().await.unwrap();
    }
}
