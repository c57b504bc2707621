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

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn spawn(workspace: &PathBuf) -> Self {
        let exe = env!("CARGO_BIN_EXE_examd");
        let mut child = Command::new(exe)
            .env_remove("EXAMD_STRICT_ALLOCATION")
            .env_remove("EXAMD_POOL_LIMIT")
            .env("EXAMD_WORKSPACE", workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn examd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    fn call_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn student(&mut self, name: &str, branch: &str, university_no: &str) -> String {
        let res = self.call_ok(
            "students.create",
            json!({ "name": name, "branch": branch, "universityNo": university_no, "year": 2, "semester": 3 }),
        );
        res["studentId"].as_str().expect("studentId").to_string()
    }

    fn classroom(&mut self, name: &str, capacity: i64, bench_count: i64) -> String {
        let res = self.call_ok(
            "classrooms.create",
            json!({ "name": name, "capacity": capacity, "benchCount": bench_count }),
        );
        res["classroomId"].as_str().expect("classroomId").to_string()
    }

    fn generate(&mut self, classroom_id: &str, branch1: &str, branch2: &str) -> serde_json::Value {
        self.call_ok(
            "seating.generate",
            json!({
                "examId1": "exam-cse",
                "examId2": "exam-ece",
                "classroomId": classroom_id,
                "branch1": branch1,
                "branch2": branch2
            }),
        )
    }

    fn allocated(&mut self, classroom_id: &str) -> Vec<String> {
        let res = self.call_ok("classrooms.get", json!({ "classroomId": classroom_id }));
        res["classroom"]["allocatedStudents"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn seat(row: &serde_json::Value, side: &str) -> String {
    row[side]["student_id"].as_str().unwrap_or("").to_string()
}

struct Fixture {
    sidecar: Sidecar,
    workspace: PathBuf,
    s: Vec<String>,
    t: Vec<String>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.workspace);
    }
}

fn fixture(prefix: &str) -> Fixture {
    let workspace = temp_dir(prefix);
    let mut sidecar = Sidecar::spawn(&workspace);
    // Created out of order to check the pool is sorted by university number.
    let s3 = sidecar.student("Sana", "CSE", "21CSE003");
    let s1 = sidecar.student("Arjun", "CSE", "21CSE001");
    let s2 = sidecar.student("Meera", "CSE", "21CSE002");
    let t2 = sidecar.student("Kiran", "ECE", "21ECE002");
    let t1 = sidecar.student("Divya", "ECE", "21ECE001");
    Fixture {
        sidecar,
        workspace,
        s: vec![s1, s2, s3],
        t: vec![t1, t2],
    }
}

#[test]
fn generate_pairs_branches_on_benches() {
    let mut fx = fixture("examd-seating-e2e");
    let room = fx.sidecar.classroom("Hall A", 20, 5);

    let res = fx.sidecar.generate(&room, "CSE", "ECE");
    assert_eq!(res["success"], json!(true), "{}", res);
    let data = &res["data"];
    assert_eq!(data["classroom"], json!("Hall A"));
    assert_eq!(data["classroom_id"], json!(room));
    assert_eq!(data["exam_id_1"], json!("exam-cse"));
    assert_eq!(data["exam_id_2"], json!("exam-ece"));
    assert_eq!(data["total_students_allocated"], json!(4));

    let rows = data["seating_data"].as_array().expect("seating_data");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["bench"], json!(1));
    assert_eq!(seat(&rows[0], "left"), fx.s[0]);
    assert_eq!(seat(&rows[0], "right"), fx.t[0]);
    assert_eq!(rows[1]["bench"], json!(2));
    assert_eq!(seat(&rows[1], "left"), fx.s[1]);
    assert_eq!(seat(&rows[1], "right"), fx.t[1]);
    assert_eq!(rows[0]["left"]["branch"], json!("CSE"));
    assert_eq!(
        rows[0]["right"]["branch_name"],
        json!("Electronics and Communication Engineering")
    );
    assert_eq!(rows[0]["left"]["university_no"], json!("21CSE001"));

    let allocated = fx.sidecar.allocated(&room);
    assert_eq!(
        allocated,
        vec![fx.s[0].clone(), fx.s[1].clone(), fx.t[0].clone(), fx.t[1].clone()]
    );
    assert!(!allocated.contains(&fx.s[2]));
}

#[test]
fn regenerate_overwrites_single_arrangement() {
    let mut fx = fixture("examd-seating-regen");
    let room = fx.sidecar.classroom("Hall A", 20, 5);

    let first = fx.sidecar.generate(&room, "CSE", "ECE");
    let second = fx.sidecar.generate(&room, "CSE", "ECE");
    assert_eq!(first["data"]["seating_data"], second["data"]["seating_data"]);

    let list = fx.sidecar.call_ok("seating.list", json!({}));
    let arrangements = list["arrangements"].as_array().expect("arrangements");
    assert_eq!(arrangements.len(), 1);
    assert_eq!(arrangements[0]["classroom"], json!("Hall A"));
    assert_eq!(arrangements[0]["version"], json!(2));
    assert_eq!(
        arrangements[0]["seating_data"].as_array().map(|a| a.len()),
        Some(2)
    );
}

#[test]
fn second_classroom_skips_already_seated_students() {
    let mut fx = fixture("examd-seating-exclusion");
    let room_a = fx.sidecar.classroom("Hall A", 20, 5);
    let room_b = fx.sidecar.classroom("Hall B", 20, 5);

    let _ = fx.sidecar.generate(&room_a, "CSE", "ECE");
    let t3 = fx.sidecar.student("Ravi", "ECE", "21ECE003");
    let res = fx.sidecar.generate(&room_b, "CSE", "ECE");
    assert_eq!(res["success"], json!(true), "{}", res);
    let rows = res["data"]["seating_data"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(seat(&rows[0], "left"), fx.s[2]);
    assert_eq!(seat(&rows[0], "right"), t3);

    let third = fx.sidecar.classroom("Hall C", 20, 5);
    let exhausted = fx.sidecar.generate(&third, "CSE", "ECE");
    assert_eq!(exhausted["success"], json!(false));
    assert_eq!(exhausted["code"], json!("insufficient_students"));
    let got = fx
        .sidecar
        .call_ok("seating.get", json!({ "classroomId": third }));
    assert!(got["arrangement"].is_null());
    assert!(fx.sidecar.allocated(&third).is_empty());
}

#[test]
fn empty_branch_reports_failure_message() {
    let mut fx = fixture("examd-seating-empty");
    let room = fx.sidecar.classroom("Hall A", 20, 5);

    let res = fx.sidecar.generate(&room, "CSE", "MECH");
    assert_eq!(res["success"], json!(false));
    let message = res["message"].as_str().expect("message");
    assert!(message.starts_with("Failed to generate seating: "), "{}", message);
    assert!(fx.sidecar.allocated(&room).is_empty());
}

#[test]
fn same_branch_on_both_sides_is_refused() {
    let mut fx = fixture("examd-seating-same-branch");
    let room = fx.sidecar.classroom("Hall A", 20, 5);

    let res = fx.sidecar.generate(&room, "CSE", "CSE");
    assert_eq!(res["success"], json!(false));
    assert_eq!(res["code"], json!("invalid_request"));
    assert!(fx.sidecar.allocated(&room).is_empty());
}

// Documents current behaviour: deleting an arrangement keeps its students allocated.
#[test]
fn delete_keeps_allocation_until_released() {
    let mut fx = fixture("examd-seating-delete");
    let room = fx.sidecar.classroom("Hall A", 20, 5);
    let _ = fx.sidecar.generate(&room, "CSE", "ECE");

    fx.sidecar
        .call_ok("seating.delete", json!({ "classroomId": room }));
    let got = fx.sidecar.call_ok("seating.get", json!({ "classroomId": room }));
    assert!(got["arrangement"].is_null());
    assert_eq!(fx.sidecar.allocated(&room).len(), 4);

    let again = fx.sidecar.call("seating.delete", json!({ "classroomId": room }));
    assert_eq!(again["error"]["code"], json!("not_found"));

    let released = fx
        .sidecar
        .call_ok("seating.release", json!({ "classroomId": room }));
    assert_eq!(released["released"], json!(4));
    assert!(fx.sidecar.allocated(&room).is_empty());
}

#[test]
fn save_accepts_edits_and_rejects_duplicates() {
    let mut fx = fixture("examd-seating-save");
    let room = fx.sidecar.classroom("Hall A", 20, 5);
    let res = fx.sidecar.generate(&room, "CSE", "ECE");
    let mut rows = res["data"]["seating_data"].clone();

    // Swap the sides of bench 1.
    let left = rows[0]["left"].clone();
    rows[0]["left"] = rows[0]["right"].clone();
    rows[0]["right"] = left;
    let saved = fx.sidecar.call_ok(
        "seating.save",
        json!({ "classroomId": room, "seatingData": rows }),
    );
    assert_eq!(saved["arrangement"]["version"], json!(2));
    assert_eq!(saved["arrangement"]["exam_id_1"], json!("exam-cse"));
    assert_eq!(seat(&saved["arrangement"]["seating_data"][0], "left"), fx.t[0]);
    assert_eq!(
        fx.sidecar.allocated(&room),
        vec![fx.t[0].clone(), fx.s[1].clone(), fx.s[0].clone(), fx.t[1].clone()]
    );

    let mut dup = rows.clone();
    dup[1]["left"] = dup[0]["left"].clone();
    let rejected = fx.sidecar.call(
        "seating.save",
        json!({ "classroomId": room, "seatingData": dup }),
    );
    assert_eq!(rejected["error"]["code"], json!("invalid_arrangement"));

    let mut outsider = rows.clone();
    outsider[0]["left"]["student_id"] = json!("ghost");
    let rejected = fx.sidecar.call(
        "seating.save",
        json!({ "classroomId": room, "seatingData": outsider }),
    );
    assert_eq!(rejected["error"]["code"], json!("invalid_arrangement"));

    let malformed = fx.sidecar.call(
        "seating.save",
        json!({ "classroomId": room, "seatingData": [{ "left": null }] }),
    );
    assert_eq!(malformed["error"]["code"], json!("bad_params"));
}

#[test]
fn strict_mode_and_pool_limit_params() {
    let mut fx = fixture("examd-seating-strict");
    let room = fx.sidecar.classroom("Hall A", 20, 0);

    let res = fx.sidecar.call_ok(
        "seating.generate",
        json!({
            "classroomId": room,
            "branch1": "CSE",
            "branch2": "ECE",
            "poolLimit": 1,
            "strict": true
        }),
    );
    assert_eq!(res["success"], json!(true), "{}", res);
    assert_eq!(res["data"]["total_students_allocated"], json!(2));
    assert!(res["data"]["exam_id_1"].is_null());

    let bad = fx.sidecar.call(
        "seating.generate",
        json!({ "classroomId": room, "branch1": "CSE", "branch2": "ECE", "poolLimit": 0 }),
    );
    assert_eq!(bad["error"]["code"], json!("bad_params"));
}

#[test]
fn deleting_a_student_frees_the_seat_but_keeps_the_snapshot() {
    let mut fx = fixture("examd-seating-student-delete");
    let room = fx.sidecar.classroom("Hall A", 20, 5);
    let _ = fx.sidecar.generate(&room, "CSE", "ECE");

    let gone = fx.s[0].clone();
    fx.sidecar
        .call_ok("students.delete", json!({ "studentId": gone }));
    assert!(!fx.sidecar.allocated(&room).contains(&gone));

    let got = fx.sidecar.call_ok("seating.get", json!({ "classroomId": room }));
    assert_eq!(seat(&got["arrangement"]["seating_data"][0], "left"), gone);

    let listed = fx
        .sidecar
        .call_ok("students.list", json!({ "branch": "CSE" }));
    assert_eq!(listed["students"].as_array().map(|a| a.len()), Some(2));

    let again = fx
        .sidecar
        .call("students.delete", json!({ "studentId": gone }));
    assert_eq!(again["error"]["code"], json!("not_found"));
}

#[test]
fn duplicate_university_number_is_a_conflict() {
    let mut fx = fixture("examd-students-unique");
    let dup = fx.sidecar.call(
        "students.create",
        json!({ "name": "Copy", "branch": "CSE", "universityNo": "21CSE001" }),
    );
    assert_eq!(dup["error"]["code"], json!("conflict"));

    let listed = fx
        .sidecar
        .call_ok("students.list", json!({ "branch": "CSE" }));
    assert_eq!(listed["students"].as_array().map(|a| a.len()), Some(3));
}
