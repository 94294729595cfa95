use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use fnv::FnvHashMap;
use log::{info, warn};

use crate::error::{require_input, CoocError, Result};


pub type VocabMap = FnvHashMap<Box<str>, i32>;

pub const UNK_TOKEN: &str = "[UNK]";


/// Closed word vocabulary with dense ids starting at 1.
///
/// The input is one word per line in descending frequency order, followed by a trailing
/// whitespace separated field (usually the count). Only the text before the last field is the
/// word, and lines without a trailing field are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocab {
    map: VocabMap,
}

/// Split a vocabulary line into its word. `None` unless there is a word and a trailing field.
fn line_word(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let split = trimmed.rfind(char::is_whitespace)?;
    Some(trimmed[..split].trim_end())
}

impl Vocab {
    pub fn load(path: &Path) -> Result<Vocab> {
        require_input(path)?;
        let file = File::open(path).map_err(|e| CoocError::io(path, e))?;
        let vocab = Vocab::from_reader(BufReader::new(file), path)?;
        info!("Reading vocab from {} and size: {}", path.display(), vocab.len());
        Ok(vocab)
    }

    /// `source` is only used in diagnostics.
    pub fn from_reader<R: BufRead>(reader: R, source: &Path) -> Result<Vocab> {
        let mut map = VocabMap::default();
        let mut next_id: i32 = 1;
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CoocError::io(source, e))?;
            let word = match line_word(&line) {
                Some(word) => word,
                None => {
                    warn!("{}:{}: skipping malformed vocab line {:?}", source.display(), line_idx + 1, line);
                    continue;
                }
            };
            if map.contains_key(word) {
                warn!("{}:{}: duplicate vocab word {:?} keeps its first id", source.display(), line_idx + 1, word);
                continue;
            }
            map.insert(Box::from(word), next_id);
            next_id += 1;
        }
        if !map.contains_key(UNK_TOKEN) {
            map.insert(Box::from(UNK_TOKEN), next_id);
        }
        Ok(Vocab { map })
    }

    pub fn get(&self, word: &str) -> Option<i32> {
        self.map.get(word).copied()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.map.contains_key(word)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|word| &**word)
    }

    /// Inverse mapping indexed by id. Slot 0 is unused since ids start at 1.
    pub fn words_by_id(&self) -> Vec<Option<&str>> {
        let mut words = vec![None; self.map.len() + 1];
        for (word, &id) in self.map.iter() {
            words[id as usize] = Some(&**word);
        }
        words
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn vocab_of(text: &str) -> Vocab {
        Vocab::from_reader(text.as_bytes(), Path::new("test.vocab")).unwrap()
    }

    #[test]
    fn ids_follow_line_order_and_unk_is_appended() {
        let vocab = vocab_of("the 10\ncat 7\ndog 5\n");
        assert_eq!(vocab.get("the"), Some(1));
        assert_eq!(vocab.get("cat"), Some(2));
        assert_eq!(vocab.get("dog"), Some(3));
        assert_eq!(vocab.get(UNK_TOKEN), Some(4));
        assert_eq!(vocab.len(), 4);
    }

    #[test]
    fn present_unk_is_not_duplicated() {
        let vocab = vocab_of("the 10\n[UNK] 8\ncat 7\n");
        assert_eq!(vocab.get(UNK_TOKEN), Some(2));
        assert_eq!(vocab.len(), 3);
    }

    #[test]
    fn ids_are_dense_despite_malformed_lines() {
        let vocab = vocab_of("the 10\n\n   \nlonely\ncat 7\nnew york 3\n");
        let ids = vocab.words().map(|w| vocab.get(w).unwrap()).sorted().collect_vec();
        assert_eq!(ids, (1..=vocab.len() as i32).collect_vec());
        assert_eq!(vocab.get("lonely"), None);
        assert_eq!(vocab.get("cat"), Some(2));
        assert_eq!(vocab.get("new york"), Some(3));
        assert_eq!(vocab.get(UNK_TOKEN), Some(4));
    }

    #[test]
    fn duplicates_keep_first_id() {
        let vocab = vocab_of("a 3\nb 2\na 1\n");
        assert_eq!(vocab.get("a"), Some(1));
        assert_eq!(vocab.get("b"), Some(2));
        assert_eq!(vocab.get(UNK_TOKEN), Some(3));
    }

    #[test]
    fn reload_is_identical() {
        let text = "the 10\ncat 7\ndog 5\n";
        assert_eq!(vocab_of(text), vocab_of(text));
    }

    #[test]
    fn words_by_id_inverts() {
        let vocab = vocab_of("the 10\ncat 7\n");
        let words = vocab.words_by_id();
        assert_eq!(words[0], None);
        assert_eq!(words[1], Some("the"));
        assert_eq!(words[2], Some("cat"));
        assert_eq!(words[3], Some(UNK_TOKEN));
    }
}
