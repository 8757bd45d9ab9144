// BM25 lexical ranking
//
// Okapi BM25 with k1 = 1.5, b = 0.75. Terms whose IDF comes out negative
// (present in more than half of the documents) get `EPSILON * mean IDF`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

const K1: f64 = 1.5;
const B: f64 = 0.75;
const EPSILON: f64 = 0.25;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid token pattern"))
}

/// Lowercased alphanumeric tokens, in order, duplicates kept
pub fn tokenize(text: &str) -> Vec<String> {
    token_pattern()
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// BM25 index over a fixed corpus
#[derive(Debug, Clone)]
pub struct Bm25 {
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl Bm25 {
    pub fn new<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut term_freqs = Vec::with_capacity(documents.len());
        let mut doc_lens = Vec::with_capacity(documents.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for document in documents {
            let tokens = tokenize(document.as_ref());
            doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let corpus_size = documents.len() as f64;
        let avg_doc_len = if documents.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / corpus_size
        };

        let mut idf: HashMap<String, f64> = doc_freqs
            .into_iter()
            .map(|(term, freq)| {
                let freq = freq as f64;
                let value = ((corpus_size - freq + 0.5) / (freq + 0.5)).ln();
                (term, value)
            })
            .collect();

        if !idf.is_empty() {
            let floor = EPSILON * idf.values().sum::<f64>() / idf.len() as f64;
            for value in idf.values_mut() {
                if *value < 0.0 {
                    *value = floor;
                }
            }
        }

        Self {
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Score of every document against the query, in corpus order
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let query_terms = tokenize(query);

        self.term_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(freqs, &doc_len)| {
                let norm = if self.avg_doc_len > 0.0 {
                    1.0 - B + B * doc_len as f64 / self.avg_doc_len
                } else {
                    1.0
                };

                query_terms
                    .iter()
                    .map(|term| {
                        let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        idf * (tf * (K1 + 1.0)) / (tf + K1 * norm)
                    })
                    .sum()
            })
            .collect()
    }

    /// Indices of the `k` best documents, best first; ties keep corpus order
    pub fn top_k(&self, query: &str, k: usize) -> Vec<usize> {
        let scores = self.scores(query);
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(k);
        order
    }
}
