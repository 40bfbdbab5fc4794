use offline_pdf_ocr::{
    config::Config,
    postprocess::{clean_lines, join_pages, page_block, page_label, LineFilter},
};

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[test]
fn trims_and_drops_empty_lines_in_order() {
    let cfg = Config::default();
    let filter = LineFilter::from_config(&cfg).unwrap();
    let out = clean_lines(&cfg, &filter, lines(&["  first ", "", "   ", "second\t"]));
    assert_eq!(out, lines(&["first", "second"]));
}

#[test]
fn keeps_lines_verbatim_when_cleaning_disabled() {
    let mut cfg = Config::default();
    cfg.postprocess.trim_whitespace = false;
    cfg.postprocess.drop_empty_lines = false;
    let filter = LineFilter::from_config(&cfg).unwrap();
    let raw = lines(&[" a ", ""]);
    assert_eq!(clean_lines(&cfg, &filter, raw.clone()), raw);
}

#[test]
fn regex_filter_only_applies_when_enabled() {
    let mut cfg = Config::default();
    cfg.postprocess.regex.patterns = vec![r"^\d+\s*/\s*\d+$".to_string()];
    let raw = lines(&["Chapter 1", "3 / 120", "body"]);

    let off = LineFilter::from_config(&cfg).unwrap();
    assert_eq!(clean_lines(&cfg, &off, raw.clone()).len(), 3);

    cfg.postprocess.remove_by_regex = true;
    let on = LineFilter::from_config(&cfg).unwrap();
    assert_eq!(clean_lines(&cfg, &on, raw), lines(&["Chapter 1", "body"]));
}

#[test]
fn invalid_pattern_is_a_config_error() {
    let mut cfg = Config::default();
    cfg.postprocess.remove_by_regex = true;
    cfg.postprocess.regex.patterns = vec!["(unclosed".to_string()];
    assert!(LineFilter::from_config(&cfg).is_err());
}

#[test]
fn normalizes_fullwidth_forms() {
    let mut cfg = Config::default();
    cfg.postprocess.normalize_unicode = true;
    let filter = LineFilter::from_config(&cfg).unwrap();
    let out = clean_lines(&cfg, &filter, lines(&["ＡＢＣ１２３"]));
    assert_eq!(out, lines(&["ABC123"]));
}

#[test]
fn page_block_is_one_based() {
    let cfg = Config::default();
    assert_eq!(page_label(&cfg, 0), "--- Page 1 ---");
    assert_eq!(
        page_block(&cfg, 4, &lines(&["你好", "world"])),
        "--- Page 5 ---\n你好\nworld\n"
    );
    assert_eq!(page_block(&cfg, 0, &[]), "--- Page 1 ---\n\n");
}

#[test]
fn join_pages_separates_with_blank_line() {
    let cfg = Config::default();
    let blocks = vec![
        page_block(&cfg, 0, &lines(&["a"])),
        page_block(&cfg, 1, &lines(&["b"])),
    ];
    assert_eq!(
        join_pages(&blocks),
        "--- Page 1 ---\na\n\n--- Page 2 ---\nb\n\n"
    );
}
