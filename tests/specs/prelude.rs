//! Shared fixture: a manager process in a temp state dir plus a blocking
//! request/reply helper.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use eq_wire::{encode, read_frame, write_message, ProtocolError, RawRequest};
use serde_json::{json, Value};

/// Generous ceiling for condition polling.
pub const WAIT_MAX: Duration = Duration::from_secs(20);

fn target_dir() -> PathBuf {
    let mut path = std::env::current_exe().expect("current_exe");
    path.pop(); // test binary file
    path.pop(); // deps
    path
}

pub fn eqd_bin() -> PathBuf {
    target_dir().join("eqd")
}

pub fn worker_bin() -> PathBuf {
    target_dir().join("eq-worker")
}

/// A running manager daemon rooted in its own temp state directory.
pub struct Manager {
    state_dir: tempfile::TempDir,
    child: Child,
}

impl Manager {
    pub fn start() -> Self {
        let state_dir = tempfile::tempdir().expect("tempdir");
        let mut child = Command::new(eqd_bin())
            .env("EQ_STATE_DIR", state_dir.path())
            .env("EQ_WORKER_BIN", worker_bin())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn eqd");

        // Wait for the READY startup marker
        let stdout = child.stdout.take().expect("stdout piped");
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let reader = std::io::BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                if line.trim() == "READY" {
                    let _ = tx.send(());
                    break;
                }
            }
        });
        rx.recv_timeout(WAIT_MAX).expect("eqd did not report READY");

        Self { state_dir, child }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.path().join("manager.sock")
    }

    /// One request/reply round trip. Panics on transport failure.
    pub fn call(&self, method: &str, params: Value) -> Value {
        self.try_call(method, params).expect("request failed")
    }

    /// One request/reply round trip, surfacing transport failures.
    pub fn try_call(&self, method: &str, params: Value) -> Result<Value, String> {
        let socket = self.socket_path();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async move {
            let stream = tokio::net::UnixStream::connect(&socket)
                .await
                .map_err(|e| format!("connect: {e}"))?;
            let (mut reader, mut writer) = stream.into_split();
            let raw = RawRequest { method: method.to_string(), params };
            let bytes = encode(&raw).map_err(|e| e.to_string())?;
            write_message(&mut writer, &bytes).await.map_err(|e| e.to_string())?;
            read_frame::<Value, _>(&mut reader, Duration::from_secs(5))
                .await
                .map_err(|e| e.to_string())
        })
    }

    /// A call that must produce no reply (`manager_kill`): the connection
    /// closes or the read times out.
    pub fn call_expect_no_reply(&self, method: &str) {
        let socket = self.socket_path();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async move {
            let stream =
                tokio::net::UnixStream::connect(&socket).await.expect("connect failed");
            let (mut reader, mut writer) = stream.into_split();
            let raw = RawRequest { method: method.to_string(), params: Value::Null };
            write_message(&mut writer, &encode(&raw).expect("encode")).await.expect("send");
            let result = read_frame::<Value, _>(&mut reader, Duration::from_secs(2)).await;
            assert!(
                matches!(
                    result,
                    Err(ProtocolError::ConnectionClosed) | Err(ProtocolError::Timeout)
                ),
                "expected no reply, got {result:?}",
            );
        });
    }

    pub fn status(&self) -> Value {
        self.call("status", Value::Null)
    }

    /// Poll `status` until the predicate holds.
    pub fn wait_for_status(&self, what: &str, predicate: impl Fn(&Value) -> bool) {
        let deadline = Instant::now() + WAIT_MAX;
        loop {
            if let Ok(status) = self.try_call("status", Value::Null) {
                if predicate(&status) {
                    return;
                }
            }
            assert!(Instant::now() < deadline, "timed out waiting for: {what}");
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Open the environment and wait until the worker is ready.
    pub fn open_environment(&self) {
        let reply = self.call("environment_open", Value::Null);
        assert_eq!(reply["success"], true, "{reply}");
        self.wait_for_status("environment to exist", |status| {
            status["worker_environment_exists"] == true && status["manager_state"] == "idle"
        });
    }

    /// Add one `count` plan with the given kwargs/meta, returning the echo.
    pub fn add_count_plan(&self, kwargs: Value, meta: Value) -> Value {
        let mut plan = json!({"name": "count", "args": [["det1", "det2"]]});
        if !kwargs.is_null() {
            plan["kwargs"] = kwargs;
        }
        if !meta.is_null() {
            plan["meta"] = meta;
        }
        let reply = self.call(
            "queue_item_add",
            json!({"plan": plan, "user": "Testing Script", "user_group": "admin"}),
        );
        assert_eq!(reply["success"], true, "{reply}");
        reply
    }

    pub fn add_stop_instruction(&self) {
        let reply = self.call(
            "queue_item_add",
            json!({
                "instruction": {"action": "queue_stop"},
                "user": "Testing Script",
                "user_group": "admin",
            }),
        );
        assert_eq!(reply["success"], true, "{reply}");
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
