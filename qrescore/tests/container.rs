//! End-to-end scenarios from the format's scenario list (S1-S6) plus a
//! handful of the testable properties (P1, P3, P4) exercised against a
//! tree built up through the facade and round-tripped through the writer
//! and reader.

use std::io::Cursor;

use qrescore::{Dir, File as QresFile, FacadeError, Node, ResourceLibrary};

fn hello_world_lib() -> ResourceLibrary<Cursor<Vec<u8>>> {
    let mut lib = ResourceLibrary::<Cursor<Vec<u8>>>::empty();
    // there is no mkdir in the public facade (the CLI surface has
    // none either); build the `a` subdirectory directly the way a loader
    // populating a fresh tree would.
    lib_insert_dir(&mut lib, "a");
    lib.add("hello.txt", ":/a", b"hi\n".to_vec()).unwrap();
    lib
}

fn lib_insert_dir(lib: &mut ResourceLibrary<Cursor<Vec<u8>>>, name: &str) {
    // Test-only helper: reaches into the crate's public `root_mut`-free API
    // via round-tripping through a directory add, since `add` only builds
    // files. We construct the directory node directly and splice it in
    // through a save/reload so every other test only ever talks to the
    // public facade surface.
    let mut root = Dir::root();
    root.insert_child(Node::Dir(Dir::new(name, qrescore::NameHash::of(name))));
    let mut bytes = Vec::new();
    qrescore::writer::write_container(&mut bytes, &root, 3).unwrap();
    *lib = ResourceLibrary::from_source(Cursor::new(bytes)).unwrap();
}

fn save_to_vec(lib: &ResourceLibrary<Cursor<Vec<u8>>>, version: u32) -> Vec<u8> {
    let mut out = Vec::new();
    lib.save(&mut out, version).unwrap();
    out
}

#[test]
fn s1_read_and_print_tree() {
    let lib = hello_world_lib();
    let mut out = String::new();
    lib.print_tree(&mut out).unwrap();
    assert_eq!(out, ":\n└── a\n    └── hello.txt\n");

    let bytes = lib.cat(":/a/hello.txt").unwrap();
    assert_eq!(bytes, vec![0x68, 0x69, 0x0A]);
}

#[test]
fn s2_repack_round_trips() {
    let lib = hello_world_lib();
    let saved = save_to_vec(&lib, 3);

    let reloaded = ResourceLibrary::from_source(Cursor::new(saved)).unwrap();
    let mut original_tree = String::new();
    lib.print_tree(&mut original_tree).unwrap();
    let mut reloaded_tree = String::new();
    reloaded.print_tree(&mut reloaded_tree).unwrap();
    assert_eq!(original_tree, reloaded_tree);
    assert_eq!(reloaded.cat(":/a/hello.txt").unwrap(), b"hi\n");
}

#[test]
fn s3_remove_file_leaves_directory_empty() {
    let mut lib = hello_world_lib();
    lib.rm(":/a/hello.txt").unwrap();

    let saved = save_to_vec(&lib, 3);
    let reloaded = ResourceLibrary::from_source(Cursor::new(saved)).unwrap();
    assert_eq!(reloaded.ls(":/a").unwrap(), Vec::<String>::new());
}

#[test]
fn s4_move_file_and_replace_on_collision() {
    let mut lib = ResourceLibrary::<Cursor<Vec<u8>>>::empty();
    lib_insert_two_dirs(&mut lib, "a", "b");
    lib.add("x", ":/a", b"first".to_vec()).unwrap();

    lib.mv(":/a/x", ":/b").unwrap();
    assert_eq!(lib.ls(":/a").unwrap(), Vec::<String>::new());
    assert_eq!(lib.cat(":/b/x").unwrap(), b"first");

    lib.add("x", ":/a", b"second".to_vec()).unwrap();
    lib.mv(":/a/x", ":/b").unwrap();
    assert_eq!(lib.cat(":/b/x").unwrap(), b"second");
}

fn lib_insert_two_dirs(lib: &mut ResourceLibrary<Cursor<Vec<u8>>>, a: &str, b: &str) {
    let mut root = Dir::root();
    root.insert_child(Node::Dir(Dir::new(a, qrescore::NameHash::of(a))));
    root.insert_child(Node::Dir(Dir::new(b, qrescore::NameHash::of(b))));
    let mut bytes = Vec::new();
    qrescore::writer::write_container(&mut bytes, &root, 3).unwrap();
    *lib = ResourceLibrary::from_source(Cursor::new(bytes)).unwrap();
}

#[test]
fn s5_add_file_is_sorted_and_readable_back() {
    let mut lib = ResourceLibrary::<Cursor<Vec<u8>>>::empty();
    lib_insert_dir(&mut lib, "docs");
    lib.add("note.md", ":/docs", b"original bytes".to_vec()).unwrap();

    assert_eq!(lib.cat(":/docs/note.md").unwrap(), b"original bytes");

    let dir = match lib.root().find_child(qrescore::NameHash::of("docs")).unwrap() {
        Node::Dir(d) => d,
        Node::File(_) => panic!("docs should be a directory"),
    };
    let hashes: Vec<u32> = dir.children().iter().map(|n| n.name_hash().raw()).collect();
    let mut sorted = hashes.clone();
    sorted.sort_unstable();
    assert_eq!(hashes, sorted, "P1: siblings stay sorted by name hash");
}

#[test]
fn s6_rejects_non_container() {
    let bytes = b"nope".to_vec();
    let err = ResourceLibrary::from_source(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, qrescore::ReaderError::NotAContainer));
}

#[test]
fn rm_missing_entry_reports_entry_not_found() {
    let mut lib = hello_world_lib();
    let err = lib.rm(":/a/missing.txt").unwrap_err();
    assert!(matches!(err, FacadeError::EntryNotFound(_)));
}

#[test]
fn cat_on_directory_reports_type_mismatch() {
    let lib = hello_world_lib();
    let err = lib.cat(":/a").unwrap_err();
    assert!(matches!(err, FacadeError::GotDirInsteadOfFile(_)));
}

#[test]
fn p3_name_dedup_shares_one_name_offset() {
    // two files named the same thing in different directories must share
    // the same interned name_offset in the written container.
    let mut lib = ResourceLibrary::<Cursor<Vec<u8>>>::empty();
    lib_insert_two_dirs(&mut lib, "a", "b");
    lib.add("same.txt", ":/a", b"one".to_vec()).unwrap();
    lib.add("same.txt", ":/b", b"two".to_vec()).unwrap();

    let saved = save_to_vec(&lib, 3);
    let reloaded = ResourceLibrary::from_source(Cursor::new(saved)).unwrap();
    let entries = reloaded.entries().unwrap();
    let offsets: Vec<u32> =
        entries.iter().filter(|e| e.name == "same.txt").map(|e| e.name_offset).collect();
    assert_eq!(offsets.len(), 2);
    assert_eq!(offsets[0], offsets[1], "P3: one name record shared by both entries");
}

#[test]
fn p4_overall_flags_matches_file_compression() {
    use qrescore::EntryFlag;

    let mut root = Dir::root();
    root.insert_child(Node::File(QresFile::from_bytes("a.txt", b"plain".to_vec())));
    let mut bytes = Vec::new();
    qrescore::writer::write_container(&mut bytes, &root, 3).unwrap();

    let reloaded = ResourceLibrary::from_source(Cursor::new(bytes)).unwrap();
    let header = reloaded.header().unwrap();
    // no compressed files were written, so overall_flags must be clear.
    assert_eq!(header.overall_flags & (EntryFlag::CompressedZstd as u32), 0);
}
