//! Text format of a persisted hyper codebook.
//!
//! The file is an ordered sequence of tagged blocks, each a keyword line
//! followed by its payload. Values within a line are separated by `;` and
//! floats are written in their shortest round-trip form, so a decoded
//! codebook encodes data exactly like the one that was saved.
//!
//! ```text
//! removeLowEnergy;<column>;<threshold>
//! standardizeInput | normalizeInput      + offsets row + scales row
//! log
//! idf;<dff row>
//! codebookText                           + stopChars, nGram, nCharGram, count, tokens
//! codebookNumeric[GMM][NGram]            + count;features;a;sigma;off + rows
//! codebookSVQ;<subVectors>               + subVectors + 1 numeric blocks
//! standardizeOutput | normalizeOutput    + offsets row + scales row
//! ```

use xbag_core::ngram::Gram;
use xbag_core::{
    ActivityFilter, AssignmentConfig, Codebook, Error, GmmParams, HyperCodebook, NGramCodebook,
    NumericCodebook, PosteriorMode, Result, Scaler, SplitCodebook, TextCodebook, Tokenizer,
    Vector,
};

const REMOVE_LOW_ENERGY: &str = "removeLowEnergy";
const STANDARDIZE_INPUT: &str = "standardizeInput";
const NORMALIZE_INPUT: &str = "normalizeInput";
const LOG: &str = "log";
const IDF: &str = "idf";
const CODEBOOK_TEXT: &str = "codebookText";
const CODEBOOK_NUMERIC: &str = "codebookNumeric";
const CODEBOOK_SVQ: &str = "codebookSVQ";
const STANDARDIZE_OUTPUT: &str = "standardizeOutput";
const NORMALIZE_OUTPUT: &str = "normalizeOutput";

/// Serialize a hyper codebook into its block format.
///
/// Fails if a text token or the stop characters contain a line break,
/// which the line-oriented format cannot hold.
pub fn encode(hyper: &HyperCodebook) -> Result<String> {
    let mut out = String::new();

    if let Some(filter) = &hyper.activity {
        push_line(
            &mut out,
            format!("{};{};{}", REMOVE_LOW_ENERGY, filter.column, filter.threshold),
        );
    }
    if let Some(scaler) = &hyper.input_scaler {
        encode_scaler(&mut out, scaler, STANDARDIZE_INPUT, NORMALIZE_INPUT);
    }
    if hyper.weighting.log {
        push_line(&mut out, LOG);
    }
    if hyper.weighting.idf {
        match &hyper.weighting.document_frequency {
            Some(dff) => push_line(&mut out, format!("{};{}", IDF, join_floats(dff))),
            None => push_line(&mut out, IDF),
        }
    }

    for codebook in &hyper.codebooks {
        match codebook {
            Codebook::Text(book) => encode_text(&mut out, book)?,
            Codebook::Numeric(book) => encode_numeric(&mut out, book),
        }
    }

    if let Some(split) = &hyper.split {
        push_line(
            &mut out,
            format!("{};{}", CODEBOOK_SVQ, split.sub_codebooks.len()),
        );
        for book in &split.sub_codebooks {
            encode_numeric(&mut out, book);
        }
        encode_numeric(&mut out, &split.top);
    }

    if let Some(scaler) = &hyper.output_scaler {
        encode_scaler(&mut out, scaler, STANDARDIZE_OUTPUT, NORMALIZE_OUTPUT);
    }
    Ok(out)
}

fn push_line(out: &mut String, line: impl AsRef<str>) {
    out.push_str(line.as_ref());
    out.push('\n');
}

fn join_floats(values: &[f32]) -> String {
    values
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

fn encode_scaler(out: &mut String, scaler: &Scaler, standardize: &str, normalize: &str) {
    push_line(
        out,
        if scaler.is_standardize() {
            standardize
        } else {
            normalize
        },
    );
    push_line(out, join_floats(scaler.offsets()));
    push_line(out, join_floats(scaler.scales()));
}

fn single_line(text: &str, what: &str) -> Result<()> {
    if text.contains(['\n', '\r']) {
        return Err(Error::InvalidConfig(format!(
            "{} {:?} contains a line break and cannot be stored",
            what, text
        )));
    }
    Ok(())
}

fn encode_text(out: &mut String, book: &TextCodebook) -> Result<()> {
    let tokenizer = book.tokenizer();
    single_line(tokenizer.stop_chars(), "stop character set")?;
    for token in book.codewords() {
        single_line(token, "text token")?;
    }
    push_line(out, CODEBOOK_TEXT);
    push_line(out, tokenizer.stop_chars());
    push_line(out, tokenizer.n_gram().to_string());
    push_line(out, tokenizer.n_char_gram().to_string());
    push_line(out, book.len().to_string());
    for token in book.codewords() {
        push_line(out, token);
    }
    Ok(())
}

fn encode_numeric(out: &mut String, book: &NumericCodebook) {
    let mut keyword = String::from(CODEBOOK_NUMERIC);
    if book.gmm().is_some() {
        keyword.push_str("GMM");
    }
    if book.ngrams().is_some() {
        keyword.push_str("NGram");
    }
    push_line(out, keyword);

    let assignment = book.assignment();
    push_line(
        out,
        format!(
            "{};{};{};{};{}",
            book.len(),
            book.dim(),
            assignment.num_assignments,
            assignment.gaussian_sigma.unwrap_or(0.0),
            assignment.off_threshold.unwrap_or(0.0)
        ),
    );
    for codeword in book.codewords() {
        push_line(out, join_floats(codeword.as_slice()));
    }

    if let Some(gmm) = book.gmm() {
        let code = assignment.posterior.map_or(0, PosteriorMode::code);
        push_line(out, format!("gmm;{}", code));
        push_line(out, join_floats(&gmm.mixture_weights));
        for covariance in &gmm.covariances {
            push_line(out, join_floats(covariance));
        }
    }

    if let Some(ngrams) = book.ngrams() {
        let presence: Vec<&str> = (1..=3)
            .map(|n| if ngrams.order(n).is_some() { "1" } else { "0" })
            .collect();
        push_line(out, presence.join(";"));
        for n in 1..=3 {
            if let Some(grams) = ngrams.order(n) {
                push_line(out, format!("num;{}", grams.len()));
                for gram in grams {
                    let row: Vec<String> = gram.iter().map(u32::to_string).collect();
                    push_line(out, row.join(";"));
                }
            }
        }
    }
}

/// Position of each block kind in the file; blocks never go backwards
fn block_rank(keyword: &str) -> Option<u8> {
    match keyword {
        REMOVE_LOW_ENERGY => Some(0),
        STANDARDIZE_INPUT | NORMALIZE_INPUT => Some(1),
        LOG => Some(2),
        IDF => Some(3),
        CODEBOOK_TEXT => Some(4),
        k if numeric_flags(k).is_some() => Some(4),
        CODEBOOK_SVQ => Some(5),
        STANDARDIZE_OUTPUT | NORMALIZE_OUTPUT => Some(6),
        _ => None,
    }
}

/// `(gmm, ngram)` flags of a numeric block keyword
fn numeric_flags(keyword: &str) -> Option<(bool, bool)> {
    match keyword.strip_prefix(CODEBOOK_NUMERIC)? {
        "" => Some((false, false)),
        "GMM" => Some((true, false)),
        "NGram" => Some((false, true)),
        "GMMNGram" => Some((true, true)),
        _ => None,
    }
}

struct Lines<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    /// Next keyword line, skipping blank lines between blocks
    fn next_block(&mut self) -> Option<(usize, &'a str)> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            if !line.trim().is_empty() {
                return Some((self.pos, line.trim()));
            }
        }
        None
    }

    /// Next payload line, taken verbatim
    fn next(&mut self) -> Result<(usize, &'a str)> {
        let line = self
            .lines
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::malformed(self.pos + 1, "unexpected end of file"))?;
        self.pos += 1;
        Ok((self.pos, line))
    }

    fn next_floats(&mut self, expected: usize) -> Result<Vec<f32>> {
        let (no, line) = self.next()?;
        let values = parse_list::<f32>(no, line)?;
        if values.len() != expected {
            return Err(Error::malformed(
                no,
                format!("expected {} values, found {}", expected, values.len()),
            ));
        }
        Ok(values)
    }
}

fn parse_field<T: std::str::FromStr>(line: usize, field: &str, what: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::malformed(line, format!("invalid {} '{}'", what, field)))
}

fn parse_list<T: std::str::FromStr>(line: usize, text: &str) -> Result<Vec<T>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(';')
        .map(|field| parse_field(line, field, "value"))
        .collect()
}

/// Parse a codebook file written by [`encode`]
pub fn decode(text: &str) -> Result<HyperCodebook> {
    let mut lines = Lines::new(text);
    let mut hyper = HyperCodebook::default();
    let mut last_rank: Option<u8> = None;

    while let Some((no, line)) = lines.next_block() {
        let mut fields = line.split(';');
        let keyword = fields.next().unwrap_or_default();
        let rank = block_rank(keyword)
            .ok_or_else(|| Error::malformed(no, format!("unknown block '{}'", keyword)))?;
        if let Some(last) = last_rank {
            if rank < last || (rank == last && rank != 4) {
                return Err(Error::malformed(
                    no,
                    format!("unexpected block ordering at '{}'", keyword),
                ));
            }
        }
        last_rank = Some(rank);
        let fields: Vec<&str> = fields.collect();

        match keyword {
            REMOVE_LOW_ENERGY => {
                let [column, threshold] = fields.as_slice() else {
                    return Err(Error::malformed(no, "expected column and threshold"));
                };
                hyper.activity = Some(ActivityFilter {
                    column: parse_field(no, column, "column")?,
                    threshold: parse_field(no, threshold, "threshold")?,
                });
            }
            STANDARDIZE_INPUT | NORMALIZE_INPUT => {
                hyper.input_scaler = Some(decode_scaler(&mut lines, no, keyword == STANDARDIZE_INPUT)?);
            }
            STANDARDIZE_OUTPUT | NORMALIZE_OUTPUT => {
                hyper.output_scaler = Some(decode_scaler(&mut lines, no, keyword == STANDARDIZE_OUTPUT)?);
            }
            LOG => hyper.weighting.log = true,
            IDF => {
                hyper.weighting.idf = true;
                if !fields.is_empty() {
                    let dff = fields
                        .iter()
                        .map(|f| parse_field(no, f, "document frequency"))
                        .collect::<Result<Vec<f32>>>()?;
                    hyper.weighting.document_frequency = Some(dff);
                }
            }
            CODEBOOK_TEXT => {
                if !hyper.codebooks.is_empty() {
                    return Err(Error::malformed(
                        no,
                        "text codebook must precede numeric codebooks",
                    ));
                }
                hyper.codebooks.push(Codebook::Text(decode_text(&mut lines)?));
            }
            CODEBOOK_SVQ => {
                if !hyper.codebooks.is_empty() {
                    return Err(Error::malformed(
                        no,
                        "split codebook cannot follow per-class codebooks",
                    ));
                }
                let [count] = fields.as_slice() else {
                    return Err(Error::malformed(no, "expected number of sub-vectors"));
                };
                let count: usize = parse_field(no, count, "number of sub-vectors")?;
                let mut sub_codebooks = Vec::with_capacity(count);
                for _ in 0..count {
                    sub_codebooks.push(decode_numeric_block(&mut lines)?);
                }
                let top = decode_numeric_block(&mut lines)?;
                hyper.split = Some(SplitCodebook { sub_codebooks, top });
            }
            _ => {
                let (gmm, ngram) = numeric_flags(keyword)
                    .ok_or_else(|| Error::malformed(no, format!("unknown block '{}'", keyword)))?;
                let book = decode_numeric(&mut lines, no, gmm, ngram)?;
                hyper.codebooks.push(Codebook::Numeric(book));
            }
        }
    }
    Ok(hyper)
}

fn decode_scaler(lines: &mut Lines<'_>, no: usize, standardize: bool) -> Result<Scaler> {
    let (offsets_no, offsets_line) = lines.next()?;
    let offsets = parse_list(offsets_no, offsets_line)?;
    let scales = lines.next_floats(offsets.len())?;
    Scaler::from_rows(standardize, offsets, scales).map_err(|e| Error::malformed(no, e.to_string()))
}

fn decode_text(lines: &mut Lines<'_>) -> Result<TextCodebook> {
    let (_, stop_chars) = lines.next()?;
    let (no, n_gram) = lines.next()?;
    let n_gram: usize = parse_field(no, n_gram, "nGram")?;
    let (no, n_char_gram) = lines.next()?;
    let n_char_gram: usize = parse_field(no, n_char_gram, "nCharGram")?;
    let (no, count) = lines.next()?;
    let count: usize = parse_field(no, count, "token count")?;

    let mut tokens = Vec::with_capacity(count);
    for _ in 0..count {
        let (_, token) = lines.next()?;
        tokens.push(token.to_string());
    }
    Ok(TextCodebook::new(
        Tokenizer::new(stop_chars, n_gram, n_char_gram),
        tokens,
    ))
}

/// A numeric block including its keyword line, as nested in a split codebook
fn decode_numeric_block(lines: &mut Lines<'_>) -> Result<NumericCodebook> {
    let (no, keyword) = lines
        .next_block()
        .ok_or_else(|| Error::malformed(lines.pos + 1, "missing numeric codebook block"))?;
    let (gmm, ngram) = numeric_flags(keyword)
        .ok_or_else(|| Error::malformed(no, format!("expected numeric codebook, found '{}'", keyword)))?;
    decode_numeric(lines, no, gmm, ngram)
}

fn decode_numeric(lines: &mut Lines<'_>, no: usize, gmm: bool, ngram: bool) -> Result<NumericCodebook> {
    let (header_no, header) = lines.next()?;
    let fields: Vec<&str> = header.split(';').collect();
    if fields.len() != 2 && fields.len() != 5 {
        return Err(Error::malformed(
            header_no,
            "expected count;features[;numAssignments;gaussianSigma;offThreshold]",
        ));
    }
    let count: usize = parse_field(header_no, fields[0], "codeword count")?;
    let dim: usize = parse_field(header_no, fields[1], "feature count")?;
    let mut assignment = AssignmentConfig::default();
    if fields.len() == 5 {
        assignment.num_assignments = parse_field(header_no, fields[2], "number of assignments")?;
        let sigma: f32 = parse_field(header_no, fields[3], "gaussian sigma")?;
        let off: f32 = parse_field(header_no, fields[4], "off threshold")?;
        assignment.gaussian_sigma = (sigma > 0.0).then_some(sigma);
        assignment.off_threshold = (off > 0.0).then_some(off);
    }

    let mut codewords = Vec::with_capacity(count);
    for _ in 0..count {
        codewords.push(Vector::new(lines.next_floats(dim)?));
    }

    let gmm = if gmm {
        let (gmm_no, gmm_line) = lines.next()?;
        let code = match gmm_line.split_once(';') {
            Some(("gmm", code)) => parse_field::<u8>(gmm_no, code, "posterior code")?,
            _ => return Err(Error::malformed(gmm_no, "expected gmm;<posterior>")),
        };
        if code != 0 {
            let mode = PosteriorMode::from_code(code)
                .ok_or_else(|| Error::malformed(gmm_no, format!("unknown posterior code {}", code)))?;
            assignment.posterior = Some(mode);
        }
        let mixture_weights = lines.next_floats(count)?;
        let mut covariances = Vec::with_capacity(count);
        for _ in 0..count {
            covariances.push(lines.next_floats(dim)?);
        }
        Some(GmmParams {
            mixture_weights,
            covariances,
        })
    } else {
        None
    };

    let ngrams = if ngram {
        Some(decode_ngrams(lines)?)
    } else {
        None
    };

    NumericCodebook::from_parts(codewords, gmm, ngrams, assignment)
        .map_err(|e| Error::malformed(no, e.to_string()))
}

fn decode_ngrams(lines: &mut Lines<'_>) -> Result<NGramCodebook> {
    let (no, presence) = lines.next()?;
    let presence: Vec<u8> = parse_list(no, presence)?;
    if presence.len() != 3 || presence.iter().any(|&p| p > 1) {
        return Err(Error::malformed(no, "expected uni;bi;tri presence flags"));
    }

    let mut orders: [Option<Vec<Gram>>; 3] = [None, None, None];
    for (n, slot) in orders.iter_mut().enumerate() {
        if presence[n] == 0 {
            continue;
        }
        let (num_no, num_line) = lines.next()?;
        let count = match num_line.split_once(';') {
            Some(("num", count)) => parse_field::<usize>(num_no, count, "n-gram count")?,
            _ => return Err(Error::malformed(num_no, "expected num;<count>")),
        };
        let mut grams = Vec::with_capacity(count);
        for _ in 0..count {
            let (gram_no, gram_line) = lines.next()?;
            let gram: Gram = parse_list(gram_no, gram_line)?.into_iter().collect();
            if gram.len() != n + 1 {
                return Err(Error::malformed(
                    gram_no,
                    format!("expected {} indices, found {}", n + 1, gram.len()),
                ));
            }
            grams.push(gram);
        }
        *slot = Some(grams);
    }
    Ok(NGramCodebook::new(orders))
}
