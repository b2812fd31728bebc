use std::collections::BTreeSet;
use std::fs;

use proptest::prelude::*;
use shiftdb::change::{ChangeParser, Direction};
use tempfile::TempDir;

fn write_change(sequences: &BTreeSet<u16>, shuffled_names: bool) -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("2024-05-01-props/change");
    fs::create_dir_all(&dir).unwrap();
    for seq in sequences {
        // Suffixes sort opposite to sequence order; only the prefix may decide.
        let suffix = if shuffled_names { 1000 - seq } else { *seq };
        fs::write(dir.join(format!("{seq:03}_step{suffix}.sql")), "SELECT 1;").unwrap();
    }
    temp
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn files_come_back_in_sequence_order(
        sequences in prop::collection::btree_set(1u16..1000, 1..24),
        shuffled in any::<bool>(),
    ) {
        let temp = write_change(&sequences, shuffled);
        let change = ChangeParser::parse(&temp.path().join("2024-05-01-props")).unwrap();
        let files = change.files(Direction::Change);

        let parsed: Vec<u16> = files.iter().map(|f| f.sequence).collect();
        let expected: Vec<u16> = sequences.iter().copied().collect();
        prop_assert_eq!(&parsed, &expected);
        prop_assert!(parsed.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(change.revert_files.is_empty());
    }
}
