use offline_pdf_ocr::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../offline-pdf-ocr.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.render.scale, 2.0);
    assert_eq!(cfg.engine.backend, "paddle");
    assert_eq!(cfg.engine.lang, "ch");
    assert!(cfg.paddle.use_angle_cls);
    assert_eq!(
        cfg.paddle.env.get("FLAGS_allocator_strategy").map(String::as_str),
        Some("auto_growth")
    );
    assert_eq!(cfg.postprocess.regex.patterns.len(), 1);
    assert!(cfg.output.page_label.contains("{n}"));
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[render]\nscale = 1.5\n").expect("parse TOML");
    let defaults = Config::default();
    assert_eq!(cfg.render.scale, 1.5);
    assert_eq!(cfg.render.pdftoppm_exe, defaults.render.pdftoppm_exe);
    assert_eq!(cfg.engine.backend, defaults.engine.backend);
    assert_eq!(cfg.output.page_label, defaults.output.page_label);
}

#[test]
fn normalized_hash_input_ignores_formatting() {
    let a: Config = toml::from_str("[engine]\nlang = \"en\"\n").unwrap();
    let b: Config = toml::from_str("[engine]\n  lang   =   \"en\"\n\n").unwrap();
    assert_eq!(a.normalized_for_hash(), b.normalized_for_hash());
}
