//! Remote filesystem façade tests: generated programs, literal parsing,
//! streamed transfers, hashing, glob and walk — all against the scripted
//! wire.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, Timelike};

use replfs::Error;
use replfs::literal::quote_bytes;

use crate::mock_wire::{MockBoard, traceback};

const T: Duration = Duration::from_secs(2);

/// Stat tuple text for a regular file of `size` bytes.
fn file_stat(size: u64) -> String {
    format!("(32768, 0, 0, 1, 0, 0, {size}, 0, 1633036800, 0)")
}

/// Stat tuple text for a directory.
fn dir_stat() -> String {
    "(16384, 0, 0, 2, 0, 0, 0, 0, 1633036800, 0)".to_string()
}

/// Directory listing literal the iterdir program prints.
fn listing(entries: &[(&str, &str)]) -> String {
    let mut out = String::from("[\n");
    for (name, stat) in entries {
        out.push_str(&format!("[ '{name}' , {stat} ],\n"));
    }
    out.push_str("]\n");
    out
}

/// One base64 line of the streamed-read batch output.
fn b64_line(data: &[u8]) -> String {
    format!("b'{}\\n' ,\n", BASE64.encode(data))
}

// ── stat / cache ─────────────────────────────────────────────

#[test]
fn stat_is_cached_per_path() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok(&format!("{}\n", file_stat(120)), "");

    let path = repl.path("/main.py");
    let st = path.stat().unwrap();
    assert_eq!(st.size, 120);
    assert!(st.is_file());
    assert_eq!(
        board.programs(),
        vec!["import os; print(os.stat('/main.py'))\n"]
    );

    // second stat answers from the cache, no further exchange
    let again = path.stat().unwrap();
    assert_eq!(again, st);
    assert_eq!(board.programs().len(), 1);
}

#[test]
fn mutation_invalidates_the_cache() {
    let board = MockBoard::new();
    let repl = board.attach();
    let path = repl.path("/data.txt");

    board.push_ok(&format!("{}\n", file_stat(3)), "");
    path.stat().unwrap();

    board.push_ok("None\n", "");
    path.unlink().unwrap();

    board.push_ok("", &traceback("OSError: [Errno 2] ENOENT"));
    assert!(matches!(path.stat(), Err(Error::FileNotFound)));
}

#[test]
fn missing_path_reports_not_found_and_exists_false() {
    let board = MockBoard::new();
    let repl = board.attach();
    let path = repl.path("/nope");

    board.push_ok("", &traceback("OSError: [Errno 2] ENOENT"));
    assert!(!path.exists().unwrap());
}

#[test]
fn relative_input_is_anchored_at_root() {
    let board = MockBoard::new();
    let repl = board.attach();
    assert_eq!(repl.path("main.py").as_str(), "/main.py");
}

// ── iterdir ──────────────────────────────────────────────────

#[test]
fn iterdir_returns_children_with_cached_stats() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok(
        &listing(&[
            ("main.py", &file_stat(120)),
            ("with space.txt", &file_stat(5)),
            ("lib", &dir_stat()),
        ]),
        "",
    );

    let entries = repl.path("/").iterdir().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].as_str(), "/main.py");
    assert_eq!(entries[1].as_str(), "/with space.txt");
    assert!(entries[2].is_dir().unwrap());

    // stats came along with the listing: one program total
    assert_eq!(entries[0].stat().unwrap().size, 120);
    assert_eq!(board.programs().len(), 1);

    // the generated program pre-anchors with a trailing slash
    assert!(board.programs()[0].contains("os.stat('/' + n)"));
}

// ── streamed read (S3) ───────────────────────────────────────

#[test]
fn streamed_read_of_1500_bytes_yields_three_blocks() {
    let data = vec![0xAB_u8; 1500];
    let board = MockBoard::new();
    let repl = board.attach();

    board.push_ok("", ""); // open + helper definition
    let mut batch = String::from("[\n");
    batch.push_str(&b64_line(&data[..512]));
    batch.push_str(&b64_line(&data[512..1024]));
    batch.push_str(&b64_line(&data[1024..]));
    batch.push_str("]\n");
    board.push_ok(&batch, "");
    board.push_ok("[\n]\n", ""); // exhausted
    board.push_ok("", ""); // close + del cleanup

    let blocks: Vec<Vec<u8>> = repl
        .path("/blob.bin")
        .read_as_stream()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].len(), 512);
    assert_eq!(blocks[1].len(), 512);
    assert_eq!(blocks[2].len(), 476);
    let joined: Vec<u8> = blocks.concat();
    assert_eq!(joined, data);

    // host-side hash of the stream equals the hash of the original
    let mut hash = hmac_sha256::Hash::new();
    hash.update(&joined);
    let mut expected = hmac_sha256::Hash::new();
    expected.update(&data);
    assert_eq!(hash.finalize(), expected.finalize());

    assert_eq!(board.unconsumed(), 0);
    // batch size follows the baud rate: 115200/5120 = 22 blocks
    assert!(board.programs().iter().any(|p| p.contains("_b(22)")));
}

#[test]
fn file_on_block_boundary_has_no_short_chunk() {
    let data = vec![0x42_u8; 1024];
    let board = MockBoard::new();
    let repl = board.attach();

    board.push_ok("", "");
    let mut batch = String::from("[\n");
    batch.push_str(&b64_line(&data[..512]));
    batch.push_str(&b64_line(&data[512..]));
    batch.push_str("]\n");
    board.push_ok(&batch, "");
    board.push_ok("[\n]\n", "");
    board.push_ok("", "");

    let blocks: Vec<Vec<u8>> = repl
        .path("/aligned.bin")
        .read_as_stream()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| b.len() == 512));
}

#[test]
fn empty_file_reads_as_zero_bytes() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("", "");
    board.push_ok("[\n]\n", "");
    board.push_ok("", "");

    let data = repl.path("/empty").read_bytes().unwrap();
    assert!(data.is_empty());
}

#[test]
fn early_drop_tears_down_the_remote_reader() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("", "");
    let mut batch = String::from("[\n");
    batch.push_str(&b64_line(&[0x01; 512]));
    batch.push_str("]\n");
    board.push_ok(&batch, "");
    board.push_ok("", ""); // cleanup triggered by drop

    {
        let mut stream = repl.path("/big.bin").read_as_stream().unwrap();
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.len(), 512);
        // consumer stops early here
    }
    assert!(
        board.programs().iter().any(|p| p.contains("_f.close()")),
        "drop must close the remote file"
    );
    assert_eq!(board.unconsumed(), 0);
}

// ── write ────────────────────────────────────────────────────

#[test]
fn write_bytes_chunks_at_512() {
    let data: Vec<u8> = (0..1300_u32).map(|i| (i % 251) as u8).collect();
    let board = MockBoard::new();
    let repl = board.attach();
    for _ in 0..5 {
        board.push_ok("", "");
    }

    let written = repl.path("/data.bin").write_bytes(&data).unwrap();
    assert_eq!(written, 1300);

    let programs = board.programs();
    assert_eq!(programs.len(), 5); // preamble + 3 chunks + cleanup
    assert!(programs[0].contains("open('/data.bin', \"wb\")"));
    assert!(programs[1].contains(&BASE64.encode(&data[..512])));
    assert!(programs[3].contains(&BASE64.encode(&data[1024..])));
    assert!(programs[4].contains("_f.close()"));
}

#[test]
fn write_then_read_round_trips() {
    let data = b"round trip payload".to_vec();
    let board = MockBoard::new();
    let repl = board.attach();

    // write: preamble + 1 chunk + cleanup
    for _ in 0..3 {
        board.push_ok("", "");
    }
    repl.path("/f").write_bytes(&data).unwrap();

    // read back what the write submitted
    let b64 = BASE64.encode(&data);
    board.push_ok("", "");
    board.push_ok(&format!("[\nb'{b64}\\n' ,\n]\n"), "");
    board.push_ok("[\n]\n", "");
    board.push_ok("", "");
    assert_eq!(repl.path("/f").read_bytes().unwrap(), data);
}

// ── sha256 ───────────────────────────────────────────────────

#[test]
fn sha256_prefers_the_board_hash() {
    let digest: Vec<u8> = (0..32).collect();
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("", ""); // hashing program
    board.push_ok(&format!("{}\n", quote_bytes(&digest)), "");

    assert_eq!(repl.path("/main.py").sha256().unwrap(), digest);
    assert!(board.programs()[0].contains("uhashlib.sha256()"));
}

#[test]
fn sha256_falls_back_to_host_hashing_without_uhashlib() {
    let content = b"no uhashlib on this board".to_vec();
    let board = MockBoard::new();
    let repl = board.attach();

    board.push_ok("", &traceback("ImportError: no module named 'uhashlib'"));
    board.push_ok("", ""); // stream preamble
    board.push_ok(&format!("[\n{}]\n", b64_line(&content)), "");
    board.push_ok("[\n]\n", "");
    board.push_ok("", ""); // stream cleanup

    let digest = repl.path("/main.py").sha256().unwrap();
    let mut expected = hmac_sha256::Hash::new();
    expected.update(&content);
    assert_eq!(digest, expected.finalize().to_vec());
}

#[test]
fn sha256_of_missing_file_is_empty() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("", &traceback("OSError: [Errno 2] ENOENT"));

    assert!(repl.path("/gone").sha256().unwrap().is_empty());
}

// ── mkdir / rmdir / rename / truncate ────────────────────────

#[test]
fn mkdir_exist_ok_swallows_the_error() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("", &traceback("OSError: [Errno 17] EEXIST"));
    repl.path("/lib").mkdir(false, true).unwrap();

    board.push_ok("", &traceback("OSError: [Errno 17] EEXIST"));
    assert!(matches!(
        repl.path("/lib").mkdir(false, false),
        Err(Error::FileExists)
    ));
}

#[test]
fn mkdir_parents_creates_ancestors_first() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("", &traceback("OSError: [Errno 17] EEXIST")); // /a
    board.push_ok("None\n", ""); // /a/b
    board.push_ok("None\n", ""); // /a/b/c

    repl.path("/a/b/c").mkdir(true, false).unwrap();
    let programs = board.programs();
    assert!(programs[0].contains("os.mkdir('/a')"));
    assert!(programs[1].contains("os.mkdir('/a/b')"));
    assert!(programs[2].contains("os.mkdir('/a/b/c')"));
}

#[test]
fn rename_stays_in_the_same_directory() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("None\n", "");

    let renamed = repl.path("/app/old.py").rename("new.py").unwrap();
    assert_eq!(renamed.as_str(), "/app/new.py");
    assert!(
        board.programs()[0].contains("os.rename('/app/old.py', '/app/new.py')")
    );

    assert!(matches!(
        repl.path("/app/x").rename("sub/y"),
        Err(Error::Value(_))
    ));
}

#[test]
fn truncate_to_zero_reports_new_size() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("0\n", "");

    assert_eq!(repl.path("/log.txt").truncate(0).unwrap(), 0);
    assert!(board.programs()[0].contains("open('/log.txt', \"ab\")"));
}

// ── glob (S5) ────────────────────────────────────────────────

#[test]
fn glob_recurses_through_double_star() {
    let board = MockBoard::new();
    let repl = board.attach();

    // traversal order of listings: /, /app (twice: ** then remainder),
    // /app/lib (twice), /app/lib/util (twice)
    board.push_ok(&listing(&[("app", &dir_stat())]), "");
    let app = listing(&[("main.py", &file_stat(10)), ("lib", &dir_stat())]);
    board.push_ok(&app, "");
    board.push_ok(&app, "");
    let lib = listing(&[("u.py", &file_stat(20)), ("util", &dir_stat())]);
    board.push_ok(&lib, "");
    board.push_ok(&lib, "");
    let util = listing(&[("v.py", &file_stat(30))]);
    board.push_ok(&util, "");
    board.push_ok(&util, "");

    let mut found: Vec<String> = repl
        .path("/")
        .glob("/app/**/*.py")
        .map(|p| p.as_str().to_string())
        .collect();
    found.sort();
    assert_eq!(
        found,
        vec!["/app/lib/u.py", "/app/lib/util/v.py", "/app/main.py"]
    );
    assert_eq!(board.unconsumed(), 0);
}

#[test]
fn double_star_matches_zero_components_but_not_prefixes() {
    let board = MockBoard::new();
    let repl = board.attach();

    let root = listing(&[
        ("foo", &file_stat(1)),
        ("foobar", &file_stat(1)),
        ("a", &dir_stat()),
    ]);
    board.push_ok(&root, "");
    board.push_ok(&root, "");
    let a = listing(&[("foo", &file_stat(1))]);
    board.push_ok(&a, "");
    board.push_ok(&a, "");

    let mut found: Vec<String> = repl
        .path("/")
        .glob("/**/foo")
        .map(|p| p.as_str().to_string())
        .collect();
    found.sort();
    assert_eq!(found, vec!["/a/foo", "/foo"]);
}

#[test]
fn glob_skips_unreadable_directories_silently() {
    let board = MockBoard::new();
    let repl = board.attach();

    board.push_ok(
        &listing(&[("ok", &dir_stat()), ("locked", &dir_stat())]),
        "",
    );
    board.push_ok(&listing(&[("x.py", &file_stat(1))]), "");
    board.push_ok("", &traceback("OSError: [Errno 13] EACCES"));

    let found: Vec<String> = repl
        .path("/")
        .glob("*/[a-z].py")
        .map(|p| p.as_str().to_string())
        .collect();
    assert_eq!(found, vec!["/ok/x.py"]);
}

// ── walk ─────────────────────────────────────────────────────

#[test]
fn walk_topdown_visits_every_directory_once() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok(
        &listing(&[("a", &dir_stat()), ("f1", &file_stat(1))]),
        "",
    );
    board.push_ok(
        &listing(&[("b", &dir_stat()), ("f2", &file_stat(2))]),
        "",
    );
    board.push_ok(&listing(&[]), "");

    let entries: Vec<_> = repl
        .path("/")
        .walk(true)
        .collect::<Result<_, _>>()
        .unwrap();
    let dirs: Vec<&str> = entries.iter().map(|e| e.dir.as_str()).collect();
    assert_eq!(dirs, vec!["/", "/a", "/a/b"]);
    let files: usize = entries.iter().map(|e| e.files.len()).sum();
    assert_eq!(files, 2);
}

#[test]
fn walk_bottomup_yields_children_first() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok(&listing(&[("a", &dir_stat())]), "");
    board.push_ok(&listing(&[("b", &dir_stat())]), "");
    board.push_ok(&listing(&[]), "");

    let entries: Vec<_> = repl
        .path("/")
        .walk(false)
        .collect::<Result<_, _>>()
        .unwrap();
    let dirs: Vec<&str> = entries.iter().map(|e| e.dir.as_str()).collect();
    assert_eq!(dirs, vec!["/a/b", "/a", "/"]);
}

#[test]
fn walk_prune_skips_subtrees() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok(
        &listing(&[("keep", &dir_stat()), ("skip", &dir_stat())]),
        "",
    );
    board.push_ok(&listing(&[("x", &file_stat(1))]), "");

    let mut walk = repl.path("/").walk(true);
    let root = walk.next().unwrap().unwrap();
    assert_eq!(root.dirs.len(), 2);
    walk.prune(|d| d.name() != "skip");

    let next = walk.next().unwrap().unwrap();
    assert_eq!(next.dir.as_str(), "/keep");
    assert!(walk.next().is_none());
    assert_eq!(board.unconsumed(), 0);
}

// ── device: statvfs, RTC (S6), flash ─────────────────────────

#[test]
fn statvfs_reports_filesystem_sizes() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("(4096, 4096, 512, 128, 128, 0, 0, 0, 0, 255)\n", "");

    let vfs = repl.statvfs("/flash").unwrap();
    assert_eq!(vfs.total_bytes(), 4096 * 512);
    assert_eq!(vfs.free_bytes(), 4096 * 128);
    assert!(board.programs()[0].contains("os.statvfs('/flash')"));
}

#[test]
fn rtc_round_trip_is_within_one_quantum() {
    let board = MockBoard::new();
    let repl = board.attach();

    let original = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_micro_opt(3, 4, 5, 500_000)
        .unwrap();

    board.push_ok("", "");
    repl.set_rtc(original).unwrap();

    // the generated program carries weekday 1-7 and the inverted
    // subsecond counter
    let program = board.programs()[0].clone();
    let tuple_text = program
        .split("datetime((")
        .nth(1)
        .and_then(|rest| rest.split(')').next())
        .unwrap();
    let fields: Vec<i64> = tuple_text
        .split(',')
        .map(|f| f.trim().parse().unwrap())
        .collect();
    assert_eq!(&fields[..4], &[2024, 1, 2, 2]); // 2024-01-02 is a Tuesday

    // a board echoing those fields back quantizes to 1/256 s
    board.push_ok(
        &format!(
            "({}, {}, {}, {}, {}, {}, {}, {})\n",
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7]
        ),
        "",
    );
    let read_back = repl.read_rtc().unwrap();
    assert_eq!(read_back.date(), original.date());
    let delta = i64::from(read_back.nanosecond() / 1000) - 500_000;
    assert!(
        delta.abs() <= 999_999 / 256 + 1,
        "round trip drifted {delta} microseconds"
    );
}

#[test]
fn flash_stream_honors_start_and_length() {
    let board = MockBoard::new();
    let repl = board.attach();

    let device: Vec<u8> = (0..2048_u32).map(|i| (i % 241) as u8).collect();

    board.push_ok("4\n", ""); // ioctl(4, 0): 4 blocks of 512
    board.push_ok("", ""); // reader helper definition
    let mut batch = String::from("[\n");
    batch.push_str(&b64_line(&device[0..512]));
    batch.push_str(&b64_line(&device[512..1024]));
    batch.push_str(&b64_line(&device[1024..1536]));
    batch.push_str("]\n");
    board.push_ok(&batch, "");
    board.push_ok("", ""); // teardown

    let blocks: Vec<Vec<u8>> = repl
        .read_flash_as_stream(100, 1000)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let joined: Vec<u8> = blocks.concat();
    assert_eq!(joined.len(), 1000);
    assert_eq!(joined, device[100..1100].to_vec());
    assert!(board.programs().iter().any(|p| p.contains("_rb(0, 3)")));
    assert_eq!(board.unconsumed(), 0);
}

#[test]
fn flash_stream_negative_length_dumps_to_device_end() {
    let board = MockBoard::new();
    let repl = board.attach();

    let device = vec![0x5A_u8; 1024];
    board.push_ok("2\n", "");
    board.push_ok("", "");
    let mut batch = String::from("[\n");
    batch.push_str(&b64_line(&device[0..512]));
    batch.push_str(&b64_line(&device[512..]));
    batch.push_str("]\n");
    board.push_ok(&batch, "");
    board.push_ok("", "");

    let total: usize = repl
        .read_flash_as_stream(0, -1)
        .unwrap()
        .map(|b| b.unwrap().len())
        .sum();
    assert_eq!(total, 1024);
}

// ── exec surface used by the collaborators ───────────────────

#[test]
fn implementation_returns_the_raw_line() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("(name='micropython', version=(1, 19, 1))\n", "");

    let info = repl.implementation().unwrap();
    assert_eq!(info, "(name='micropython', version=(1, 19, 1))");
}

#[test]
fn exec_with_custom_timeout_still_round_trips() {
    let board = MockBoard::new();
    let repl = board.attach();
    board.push_ok("done\n", "");
    let out = repl.exec("print('done')", Duration::from_secs(10)).unwrap();
    assert_eq!(out, "done\n");
}
