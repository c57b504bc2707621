use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "examd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Students, faculty and admins share one table; only role = 'student' is ever seated.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            role TEXT NOT NULL,
            university_no TEXT,
            branch TEXT,
            year INTEGER,
            semester INTEGER,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role_branch ON users(role, branch)",
        [],
    )?;
    // NULLs stay allowed for staff without a university number.
    conn.execute("DROP INDEX IF EXISTS idx_users_university_no", [])?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_users_university_no ON users(university_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            bench_count INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    ensure_classrooms_bench_count(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            exam_date TEXT,
            branch TEXT
        )",
        [],
    )?;

    // One row per seated student. The whole table is the system-wide exclusion set;
    // rows for one classroom are always replaced together.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS allocated_students(
            classroom_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY(classroom_id, student_id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_allocated_students_student ON allocated_students(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS seating_arrangements(
            classroom_id TEXT PRIMARY KEY,
            exam_id_1 TEXT,
            exam_id_2 TEXT,
            seating_data TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    ensure_seating_arrangements_version(conn)?;

    Ok(())
}

fn ensure_classrooms_bench_count(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classrooms", "bench_count")? {
        return Ok(());
    }
    // Older workspaces only stored capacity; 0 means "derive from capacity".
    conn.execute(
        "ALTER TABLE classrooms ADD COLUMN bench_count INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn ensure_seating_arrangements_version(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "seating_arrangements", "version")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE seating_arrangements ADD COLUMN version INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
