//! Lexical index: the fixed tokenizer and an Okapi-BM25 scorer.
//!
//! The tokenizer must behave identically at ingestion and query time, so
//! it is the single function both paths call. The scorer is rebuilt from
//! the bundled chunk texts on load, which keeps the on-disk format down to
//! the texts themselves and makes the build/query round-trip exact by
//! construction.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Term-frequency saturation parameter.
const BM25_K1: f64 = 1.5;
/// Document-length normalization parameter.
const BM25_B: f64 = 0.75;

/// Splits text into BM25 tokens.
///
/// Rules, applied per character:
/// 1. A CJK ideograph (U+4E00–U+9FFF) becomes its own token, flushing any
///    alphanumeric run in progress.
/// 2. An ASCII letter or digit extends the current alphanumeric run.
/// 3. Whitespace flushes the current run.
/// 4. An ASCII comma between two digits is a thousands separator and is
///    dropped without flushing, so `3,000` tokenizes as `3000`.
/// 5. Any other character flushes the current run and is emitted as its
///    own single-character token.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if ('\u{4e00}'..='\u{9fff}').contains(&c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_ascii_alphanumeric() {
            current.push(c);
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if c == ','
            && current.chars().next_back().is_some_and(|p| p.is_ascii_digit())
            && chars.peek().is_some_and(char::is_ascii_digit)
        {
            // thousands separator inside a digit run
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Okapi-BM25 scorer over one file's chunks.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    /// Per-document term frequencies.
    doc_term_freqs: Vec<HashMap<String, u32>>,
    /// Per-document token counts.
    doc_lengths: Vec<u32>,
    /// Document frequency per term.
    doc_freqs: HashMap<String, u32>,
    /// Average document length.
    avgdl: f64,
}

impl Bm25Index {
    /// Builds the scorer from chunk texts.
    #[must_use]
    pub fn build(texts: &[String]) -> Self {
        let mut doc_term_freqs = Vec::with_capacity(texts.len());
        let mut doc_lengths = Vec::with_capacity(texts.len());
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();

        for text in texts {
            let tokens = tokenize(text);
            #[allow(clippy::cast_possible_truncation)]
            doc_lengths.push(tokens.len() as u32);

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            doc_term_freqs.push(freqs);
        }

        let avgdl = if doc_lengths.is_empty() {
            0.0
        } else {
            f64::from(doc_lengths.iter().sum::<u32>()) / doc_lengths.len() as f64
        };

        Self {
            doc_term_freqs,
            doc_lengths,
            doc_freqs,
            avgdl,
        }
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_term_freqs.len()
    }

    /// True when no documents are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_term_freqs.is_empty()
    }

    /// BM25 score of every document against the query tokens, in document
    /// order.
    #[must_use]
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        let n = self.doc_term_freqs.len();
        let mut scores = vec![0.0; n];
        if n == 0 || self.avgdl == 0.0 {
            return scores;
        }

        #[allow(clippy::cast_precision_loss)]
        let total_docs = n as f64;

        for term in query_tokens {
            let Some(&df) = self.doc_freqs.get(term) else {
                continue;
            };
            // Always-positive idf variant: ln(1 + (N - df + 0.5) / (df + 0.5)).
            let idf = (1.0 + (total_docs - f64::from(df) + 0.5) / (f64::from(df) + 0.5)).ln();

            for (doc, freqs) in self.doc_term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let tf = f64::from(tf);
                let len_norm = BM25_K1
                    * BM25_B.mul_add(f64::from(self.doc_lengths[doc]) / self.avgdl, 1.0 - BM25_B);
                scores[doc] += idf * tf * (BM25_K1 + 1.0) / (tf + len_norm);
            }
        }

        scores
    }
}

/// On-disk BM25 bundle: the chunk texts plus file identity.
///
/// The scorer itself is rebuilt from the texts on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Bundle {
    /// Ordered chunk texts.
    pub chunks: Vec<String>,
    /// Bundle metadata.
    pub metadata: Bm25BundleMetadata,
}

/// Metadata stored with a BM25 bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25BundleMetadata {
    /// Source document identifier.
    pub file_id: String,
}

impl Bm25Bundle {
    /// Writes the bundle as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Load`] when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let json = serde_json::to_vec(self).map_err(|e| IndexError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| IndexError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Reads a bundle from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Load`] when the file cannot be read and
    /// [`IndexError::Corrupt`] when it does not parse.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path).map_err(|e| IndexError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| IndexError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_tokenize_mixed_cjk_and_numbers() {
        assert_eq!(
            tokenize("预算3,000元 (A/B)"),
            toks(&["预", "算", "3000", "元", "(", "A", "/", "B", ")"])
        );
    }

    #[test]
    fn test_tokenize_cjk_flushes_run() {
        assert_eq!(tokenize("abc预def"), toks(&["abc", "预", "def"]));
    }

    #[test]
    fn test_tokenize_whitespace_separates() {
        assert_eq!(tokenize("hello  world"), toks(&["hello", "world"]));
    }

    #[test]
    fn test_tokenize_punctuation_emits_itself() {
        assert_eq!(tokenize("a-b"), toks(&["a", "-", "b"]));
        assert_eq!(tokenize("第3条。"), toks(&["第", "3", "条", "。"]));
    }

    #[test]
    fn test_tokenize_comma_outside_digits_emits() {
        assert_eq!(tokenize("a,b"), toks(&["a", ",", "b"]));
        assert_eq!(tokenize("3,"), toks(&["3", ","]));
        assert_eq!(tokenize(",3"), toks(&[",", "3"]));
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_tokenize_round_trip_multiset() {
        let cases = [
            "预算3,000元 (A/B)",
            "第 12 页的 deadline 是 2026-03-01",
            "mixed 中英文 text!",
        ];
        for case in cases {
            let tokens = tokenize(case);
            let rejoined = tokens.join(" ");
            let mut again = tokenize(&rejoined);
            let mut original = tokens;
            original.sort();
            again.sort();
            assert_eq!(original, again, "round trip failed for {case:?}");
        }
    }

    #[test]
    fn test_bm25_empty_corpus() {
        let index = Bm25Index::build(&[]);
        assert!(index.is_empty());
        assert!(index.scores(&toks(&["x"])).is_empty());
    }

    #[test]
    fn test_bm25_scores_relevant_doc_highest() {
        let corpus = vec![
            "the tender deadline is march first".to_string(),
            "budget tables and cost breakdown".to_string(),
            "deadline deadline deadline extensions".to_string(),
        ];
        let index = Bm25Index::build(&corpus);
        let scores = index.scores(&tokenize("deadline"));
        assert_eq!(scores.len(), 3);
        assert!(scores[2] > scores[0]);
        assert!(scores[0] > 0.0);
        assert!(scores[1].abs() < f64::EPSILON);
    }

    #[test]
    fn test_bm25_unknown_term_scores_zero() {
        let corpus = vec!["alpha beta".to_string()];
        let index = Bm25Index::build(&corpus);
        let scores = index.scores(&tokenize("gamma"));
        assert!(scores[0].abs() < f64::EPSILON);
    }

    #[test]
    fn test_bm25_cjk_query() {
        let corpus = vec![
            "项目预算为三百万元".to_string(),
            "投标截止时间为三月".to_string(),
        ];
        let index = Bm25Index::build(&corpus);
        let scores = index.scores(&tokenize("预算"));
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_bm25_idf_always_positive() {
        // A term present in every document still contributes positively.
        let corpus = vec![
            "common word here".to_string(),
            "common word there".to_string(),
        ];
        let index = Bm25Index::build(&corpus);
        let scores = index.scores(&tokenize("common"));
        assert!(scores.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f1.bm25.json");
        let bundle = Bm25Bundle {
            chunks: vec!["第一页内容".to_string(), "第二页内容".to_string()],
            metadata: Bm25BundleMetadata {
                file_id: "f1".to_string(),
            },
        };
        bundle.save(&path).unwrap();
        let loaded = Bm25Bundle::load(&path).unwrap();
        assert_eq!(loaded.chunks, bundle.chunks);
        assert_eq!(loaded.metadata.file_id, "f1");
    }

    #[test]
    fn test_bundle_load_missing_file() {
        let err = Bm25Bundle::load(Path::new("/nonexistent/f.bm25.json")).unwrap_err();
        assert!(matches!(err, IndexError::Load { .. }));
    }

    #[test]
    fn test_bundle_load_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bm25.json");
        fs::write(&path, b"not json").unwrap();
        let err = Bm25Bundle::load(&path).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[test]
    fn test_build_query_ordering_round_trip() {
        // Ingestion+query over a saved/reloaded bundle reproduces the same
        // top-k ordering as scoring the in-memory corpus directly.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f1.bm25.json");
        let corpus = vec![
            "投标文件提交截止时间".to_string(),
            "项目预算3,000元".to_string(),
            "资质证书要求".to_string(),
        ];
        let direct = Bm25Index::build(&corpus);

        let bundle = Bm25Bundle {
            chunks: corpus,
            metadata: Bm25BundleMetadata {
                file_id: "f1".to_string(),
            },
        };
        bundle.save(&path).unwrap();
        let reloaded = Bm25Bundle::load(&path).unwrap();
        let rebuilt = Bm25Index::build(&reloaded.chunks);

        let query = tokenize("截止时间");
        let rank = |scores: Vec<f64>| {
            let mut order: Vec<usize> = (0..scores.len()).collect();
            order.sort_by(|&a, &b| {
                scores[b]
                    .partial_cmp(&scores[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            order
        };
        assert_eq!(rank(direct.scores(&query)), rank(rebuilt.scores(&query)));
    }
}
