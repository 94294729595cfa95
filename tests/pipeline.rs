use std::fs;
use std::path::Path;

use semcooc::aggregate::BpeAggregator;
use semcooc::codec::{read_bin, RECORD_SIZE};
use semcooc::convert::{bin_to_txt, txt_to_bin};
use semcooc::dump::{count_dump, DumpFormat};
use semcooc::error::CoocError;
use semcooc::merge::{merge_shard_dir, merge_shards};
use semcooc::pieces::PieceTable;
use semcooc::reweight::Reweighting;
use semcooc::table::CooccurrenceTable;
use semcooc::vocab::Vocab;


fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn identical_shards_sum() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.coo", "a\tb\t1.0\n");
    let b = write(dir.path(), "b.coo", "a\tb\t1.0\n");
    let merged = merge_shards(&[a, b]).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged.get("a", "b"), Some(2.0));
}

#[test]
fn merge_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let shards = dir.path().join("shards");
    fs::create_dir(&shards).unwrap();
    write(&shards, "x.coo", "a\tb\t0.5\nc\td\t1.0\na\tb\t0.25\n");
    write(&shards, "y.coo", "e\tf\t2.0\na\tb\t1.0\n");
    let out = shards.join("merged.coo");

    let first = merge_shard_dir(&shards, &out).unwrap();
    let first_text = fs::read_to_string(&out).unwrap();
    let second = merge_shard_dir(&shards, &out).unwrap();
    let second_text = fs::read_to_string(&out).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_text, second_text);
    assert_eq!(first.get("a", "b"), Some(1.75));
    assert_eq!(first_text, "a\tb\t1.75000000\nc\td\t1.00000000\ne\tf\t2.00000000\n");
}

#[test]
fn missing_dump_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = count_dump(&dir.path().join("nope"), DumpFormat::Mlm, 5, Reweighting::Divide).unwrap_err();
    assert!(matches!(err, CoocError::MissingInput(_)));
}

#[test]
fn mlm_dumps_to_binary_word_table() {
    let dir = tempfile::tempdir().unwrap();
    let shards = dir.path().join("shards");
    fs::create_dir(&shards).unwrap();

    let dump_a = write(
        dir.path(),
        "a.dump",
        "###the cat sat\nthe cat:4.0 a:2.0\ncat the:2.0 dog:1.0\nsat on:3.0 the:1.5\n",
    );
    let dump_b = write(
        dir.path(),
        "b.dump",
        "###a cat playing\ncat play:2.0 the:1.0\nplay cat:1.0 ##ing:1.0\n##ing cat:4.0\nbroken\n",
    );
    for dump in [dump_a, dump_b].iter() {
        let (table, stats) = count_dump(dump, DumpFormat::Mlm, 1, Reweighting::Divide).unwrap();
        assert_eq!(stats.lines, 1);
        let name = format!("{}.coo", dump.file_name().unwrap().to_string_lossy());
        table.write_text(&shards.join(name)).unwrap();
    }

    let merged_path = dir.path().join("bpe.coo");
    let merged = merge_shard_dir(&shards, &merged_path).unwrap();
    assert_eq!(merged.get("cat", "the"), Some(1.5));
    assert_eq!(merged.get("cat", "dog"), Some(0.5));
    assert_eq!(merged.get("cat", "play"), Some(1.0));
    assert_eq!(merged.get("##ing", "cat"), Some(1.0));

    let vocab_path = write(dir.path(), "vocab.txt", "the 10\ncat 7\ndog 5\nplaying 2\n");
    let vocab = Vocab::load(&vocab_path).unwrap();
    let mut pieces = PieceTable::new();
    pieces.insert("playing", vec!["play", "##ing"]);
    let pair_path = write(dir.path(), "pairs.txt", "cat\tthe\t3\ncat\tplaying\t2\nplaying\tcat\t1\ndog\tcat\t0\n");

    let sub = CooccurrenceTable::read_text(&merged_path).unwrap();
    let mut aggregator = BpeAggregator::new(&pieces, 2.0).unwrap();
    let (words, stats) = aggregator.aggregate(&vocab, &pair_path, &sub).unwrap();
    assert_eq!(stats.rare, 1);
    assert_eq!(words.get("cat", "the"), Some(1.5));
    // (play + ##ing) / 2 * scale = (1.0 + 0) / 2 * 2
    assert_eq!(words.get("cat", "playing"), Some(1.0));
    // (play,cat) 1.0 + (##ing,cat) 1.0, averaged then scaled
    assert_eq!(words.get("playing", "cat"), Some(2.0));

    let word_path = dir.path().join("word.coo");
    words.write_text(&word_path).unwrap();
    let bin_path = dir.path().join("word.coo.bin");
    let stats = txt_to_bin(&vocab, &word_path, &bin_path).unwrap();
    assert_eq!(stats.written, words.len() as u64);
    assert_eq!(fs::metadata(&bin_path).unwrap().len(), words.len() as u64 * RECORD_SIZE as u64);

    let records = read_bin(&bin_path).unwrap();
    let cat = vocab.get("cat").unwrap();
    let playing = vocab.get("playing").unwrap();
    assert!(records.iter().any(|r| r.target == playing && r.context == cat && r.value == 2.0));

    let back_path = dir.path().join("word.back.coo");
    bin_to_txt(&vocab, &bin_path, &back_path).unwrap();
    assert_eq!(fs::read_to_string(&back_path).unwrap(), fs::read_to_string(&word_path).unwrap());
}

#[test]
fn san_dump_counts() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write(
        dir.path(),
        "a.san",
        "###the cat sat\n0###0:3.0 1:2.0 2:1.0\n1###0:1.0 1:3.0 2:0.5\n2###0:0.2 1:0.4\n",
    );
    let (table, stats) = count_dump(&dump, DumpFormat::San, 1, Reweighting::Reciprocal).unwrap();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.skipped, 1);
    assert_eq!(table.get("the", "cat"), Some(1.0));
    assert_eq!(table.get("cat", "the"), Some(1.0));
    assert_eq!(table.get("cat", "sat"), Some(0.5));
    assert_eq!(table.get("the", "sat"), None);
}
