//! Unit tests for CartoCSS style export.

use serde_json::json;
use viz_export::export::StyleExporter;

#[test]
fn test_export_simple_rule() {
    let style = StyleExporter::export(
        "#parks { polygon-fill: #0F0; polygon-opacity: 0.7; line-width: 1; }",
        Some("2.1.1"),
    );

    assert_eq!(style["version"], "2.1.1");
    let rules = style["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["selector"], "#parks");
    assert_eq!(rules[0]["declarations"]["polygon-fill"], "#0F0");
    assert_eq!(rules[0]["declarations"]["polygon-opacity"], json!(0.7));
    assert_eq!(rules[0]["declarations"]["line-width"], json!(1));
}

#[test]
fn test_nested_blocks_are_flattened() {
    let css = r#"
        #roads {
          line-color: #333;
          [zoom >= 12] { line-width: 2; }
          ::casing { line-color: #000; }
        }
    "#;
    let (_, rules) = StyleExporter::parse(css);

    let selectors: Vec<&str> = rules.iter().map(|r| r.selector.as_str()).collect();
    assert_eq!(selectors, vec!["#roads", "#roads[zoom >= 12]", "#roads::casing"]);
    assert_eq!(rules[1].declarations["line-width"], json!(2));
}

#[test]
fn test_variables_are_substituted() {
    let css = "@water: #0000FF;\n#lakes { polygon-fill: @water; }";
    let style = StyleExporter::export(css, None);

    assert!(style["version"].is_null());
    assert_eq!(style["variables"]["@water"], "#0000FF");
    assert_eq!(style["rules"][0]["declarations"]["polygon-fill"], "#0000FF");
}

#[test]
fn test_comments_and_urls() {
    let css = r#"
        /* markers */
        #poi {
          marker-file: url(http://example.com/pin.svg); // remote icon
          text-name: "[name]";
        }
    "#;
    let (_, rules) = StyleExporter::parse(css);

    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules[0].declarations["marker-file"],
        "url(http://example.com/pin.svg)"
    );
    assert_eq!(rules[0].declarations["text-name"], "\"[name]\"");
}

#[test]
fn test_top_level_declaration_uses_global_selector() {
    let (_, rules) = StyleExporter::parse("Map { background-color: #fff; } buffer-size: 64;");
    assert_eq!(rules[0].selector, "Map");
    assert_eq!(rules[1].selector, "*");
    assert_eq!(rules[1].declarations["buffer-size"], json!(64));
}
