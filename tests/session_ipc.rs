use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
    seq: usize,
}

impl Session {
    fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            child,
            stdin,
            reader,
            workspace,
            seq: 0,
        };
        let path = s.workspace.to_string_lossy().to_string();
        s.ok("workspace.select", json!({ "path": path }));
        s.ok(
            "teachers.upsert",
            json!({ "teacherId": "A", "name": "Amal", "subjects": ["English", "Science"] }),
        );
        s.ok(
            "teachers.upsert",
            json!({ "teacherId": "B", "name": "Basel", "subjects": ["English", "Math"] }),
        );
        s
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        let id = self.seq.to_string();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        let id = self.seq.to_string();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn set(&mut self, field: &str, value: &str) -> serde_json::Value {
        self.ok("session.set", json!({ "field": field, "value": value }))
    }

    fn fill(&mut self, day: &str, time: &str, grade: &str, subject: &str, teacher: &str) {
        self.set("day", day);
        self.set("time", time);
        self.set("grade", grade);
        self.set("subject", subject);
        self.set("teacherId", teacher);
    }

    fn close(self) {
        let Session {
            mut child,
            stdin,
            workspace,
            ..
        } = self;
        drop(stdin);
        let _ = child.wait();
        let _ = std::fs::remove_dir_all(workspace);
    }
}

#[test]
fn state_tracks_how_many_fields_are_set() {
    let mut s = Session::open("session-states");
    let got = s.ok("session.get", json!({}));
    assert_eq!(got["state"], "empty");
    assert_eq!(got["lastOutcome"], serde_json::Value::Null);

    assert_eq!(s.set("day", "Tuesday")["state"], "partial");
    s.set("time", "10:00");
    s.set("grade", "Stage 1");
    s.set("subject", "English");
    let got = s.set("teacherId", "A");
    assert_eq!(got["state"], "complete");
    assert_eq!(got["selection"]["teacherId"], "A");

    let got = s.ok("session.clear", json!({ "field": "time" }));
    assert_eq!(got["state"], "partial");
    assert_eq!(got["selection"]["time"], serde_json::Value::Null);

    let got = s.ok("session.reset", json!({}));
    assert_eq!(got["state"], "empty");
    s.close();
}

#[test]
fn changing_subject_drops_the_teacher() {
    let mut s = Session::open("session-subject");
    s.set("subject", "English");
    s.set("teacherId", "B");
    let got = s.set("subject", "Math");
    assert_eq!(got["selection"]["teacherId"], serde_json::Value::Null);

    s.set("teacherId", "B");
    let got = s.set("subject", "Math");
    assert_eq!(got["selection"]["teacherId"], "B");

    let got = s.set("subject", "");
    assert_eq!(got["selection"]["subject"], serde_json::Value::Null);
    assert_eq!(got["selection"]["teacherId"], serde_json::Value::Null);
    s.close();
}

#[test]
fn commit_keeps_slot_and_clears_subject_and_teacher() {
    let mut s = Session::open("session-commit");
    s.fill("Tuesday", "10:00", "Stage 1", "English", "A");
    let got = s.ok("session.submit", json!({}));
    let entry_id = got["entryId"].as_str().expect("entryId").to_string();
    assert_eq!(got["state"], "partial");
    assert_eq!(got["selection"]["day"], "Tuesday");
    assert_eq!(got["selection"]["time"], "10:00");
    assert_eq!(got["selection"]["grade"], "Stage 1");
    assert_eq!(got["selection"]["subject"], serde_json::Value::Null);
    assert_eq!(got["lastOutcome"]["kind"], "committed");
    assert_eq!(got["lastOutcome"]["entryId"], entry_id.as_str());

    let listed = s.ok("timetable.list", json!({}));
    assert_eq!(listed["entries"][0]["id"], entry_id.as_str());
    s.close();
}

#[test]
fn rejected_submit_retains_every_field() {
    let mut s = Session::open("session-reject");
    s.fill("Tuesday", "10:00", "Stage 1", "English", "A");
    s.ok("session.submit", json!({}));

    s.set("subject", "English");
    s.set("teacherId", "B");
    let res = s.call("session.submit", json!({}));
    assert_eq!(res["ok"], false);
    assert_eq!(res["error"]["code"], "slot_already_scheduled");

    let got = s.ok("session.get", json!({}));
    assert_eq!(got["state"], "complete");
    assert_eq!(got["selection"]["teacherId"], "B");
    assert_eq!(got["lastOutcome"]["kind"], "rejected");
    assert_eq!(got["lastOutcome"]["code"], "slot_already_scheduled");

    s.set("grade", "Stage 4");
    s.set("subject", "Science");
    s.set("teacherId", "A");
    let res = s.call("session.submit", json!({}));
    assert_eq!(res["error"]["code"], "teacher_double_booked");
    s.close();
}

#[test]
fn incomplete_submit_lists_missing_fields() {
    let mut s = Session::open("session-incomplete");
    s.set("day", "Monday");
    let res = s.call("session.submit", json!({}));
    assert_eq!(res["error"]["code"], "incomplete_selection");
    assert_eq!(
        res["error"]["details"]["missing"],
        json!(["time", "grade", "subject", "teacherId"])
    );
    s.close();
}

#[test]
fn bad_field_or_value_is_bad_params() {
    let mut s = Session::open("session-bad-params");
    let res = s.call("session.set", json!({ "field": "room", "value": "12" }));
    assert_eq!(res["error"]["code"], "bad_params");
    let res = s.call("session.set", json!({ "field": "time", "value": "25:00" }));
    assert_eq!(res["error"]["code"], "bad_params");
    let got = s.ok("session.get", json!({}));
    assert_eq!(got["state"], "empty");
    s.close();
}

#[test]
fn reselecting_workspace_starts_a_fresh_session() {
    let mut s = Session::open("session-reselect");
    s.set("day", "Friday");
    let path = s.workspace.to_string_lossy().to_string();
    s.ok("workspace.select", json!({ "path": path }));
    let got = s.ok("session.get", json!({}));
    assert_eq!(got["state"], "empty");
    s.close();
}
