use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::collections::HashMap;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::completion::{PairOutcome, PairReport};
use crate::error::Result;
use crate::tree::Tree;

/// Strip BEAST annotations from Newick strings.
///
/// BEAST format includes annotations like :[&rate=0.123]2.45 where 2.45 is the
/// actual branch length. This function removes the [&...] annotations while
/// preserving the branch lengths.
pub fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// Read every tree of a file.
///
/// Plain files hold one Newick tree per non-empty line. Files starting with
/// `#NEXUS` are read from their TREES block instead, with TRANSLATE labels
/// applied. A `.gz` suffix means the file is gzip-compressed.
///
/// Each tree gets its own `Result` so a malformed line only fails the pairs
/// it takes part in.
///
/// # Errors
/// Only I/O failures are returned as the outer error.
pub fn read_newick_trees<P: AsRef<Path>>(path: P) -> Result<Vec<Result<Tree>>> {
    let content = read_text(path.as_ref())?;
    Ok(parse_trees(&content))
}

fn read_text(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut content = String::new();
    if path.to_string_lossy().ends_with(".gz") {
        GzDecoder::new(file).read_to_string(&mut content)?;
    } else {
        io::BufReader::new(file).read_to_string(&mut content)?;
    }
    Ok(content)
}

/// Parse the text of a tree file, see [`read_newick_trees`].
pub fn parse_trees(content: &str) -> Vec<Result<Tree>> {
    if content.trim_start().to_ascii_uppercase().starts_with("#NEXUS") {
        let taxa = parse_taxon_block(content);
        return collect_tree_blocks(content)
            .into_iter()
            .map(|body| {
                let mut tree = Tree::from_newick(&body)?;
                if !taxa.is_empty() {
                    tree.rename_leaves(&taxa)?;
                }
                Ok(tree)
            })
            .collect();
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Tree::from_newick)
        .collect()
}

fn collect_tree_blocks(content: &str) -> Vec<String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        // Headers may carry their own annotations:
        // tree STATE_0 [&lnP=-3622.4,posterior=-3622.4] = [&R] (...)
        .filter_map(|line| {
            let mut parts = line.splitn(2, " = ");
            let _header = parts.next()?;
            Some(parts.next()?.trim().to_string())
        })
        .collect()
}

fn parse_taxon_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        // 1 'Homo_sapiens',
        .filter_map(|line| {
            let line = line.trim().trim_end_matches(',').trim_end_matches(';');
            let (id, label) = line.split_once(char::is_whitespace)?;
            Some((id.to_string(), label.trim().trim_matches('\'').to_string()))
        })
        .collect()
}

/// Text block for one pair, in the layout of the report file.
pub fn format_outcome(outcome: &PairOutcome) -> String {
    let header = format!("Tree pair {} and {}:", outcome.first, outcome.second);
    match &outcome.result {
        Ok(report) => format!("{header}\n{}", format_report(report)),
        Err(e) => format!("{header} error: {e}"),
    }
}

fn format_report(report: &PairReport) -> String {
    let mut text = format!("BSD(+) = {:.4}", report.bsd_plus);
    if let Some(minus) = &report.bsd_minus {
        text.push_str(&format!(", BSD(-) = {:.4}", minus.value));
    }
    text.push_str(&format!(
        "\nCompleted Tree 1:\n{}\nCompleted Tree 2:\n{}",
        report.completion.first.to_newick(),
        report.completion.second.to_newick()
    ));
    if let Some(minus) = &report.bsd_minus {
        text.push_str(&format!(
            "\nPruned Tree 1:\n{}\nPruned Tree 2:\n{}",
            minus.first.to_newick(),
            minus.second.to_newick()
        ));
    }
    text
}

/// Write the report for all pairs to a file or stdout.
/// If `path` ends with `.gz`, the output is gzip-compressed.
/// If `path` equals `-`, the report is written to stdout (uncompressed).
pub fn write_report<P: AsRef<Path>>(path: P, outcomes: &[PairOutcome]) -> Result<()> {
    let p = path.as_ref();
    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if p.to_string_lossy().ends_with(".gz") {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    for outcome in outcomes {
        writeln!(&mut out, "{}", format_outcome(outcome))?;
    }

    out.flush()?;
    Ok(())
}
