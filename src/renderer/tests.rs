use super::*;
use crate::{config::Configuration, db::MemoryDatabase};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

fn engine() -> Engine {
    let _ = env_logger::try_init();
    Engine::new(Configuration::default())
}

fn html(engine: &Engine, text: &str) -> String {
    engine.render(text, &RenderOptions::default()).html
}

#[test]
fn rerender_is_identical() {
    let engine = engine();
    engine.create_template("Greet", "Hello, {{{1}}}!", None).unwrap();
    let text = "== Intro ==\n{{Greet|World}} [[Category:Tests]]";
    let first = engine.render(text, &RenderOptions::default());
    let second = engine.render(text, &RenderOptions::default());
    assert_eq!(first, second);

    let stats = engine.cache_stats();
    assert_eq!(stats.len, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn self_transclusion_terminates() {
    let engine = engine();
    engine.create_template("Loop", "a{{Loop}}", None).unwrap();
    let html = html(&engine, "{{Loop}}");
    assert!(
        html.contains(r#"<strong class="error">Template recursion depth exceeded: Loop</strong>"#),
        "{html}"
    );
    assert!(
        html.starts_with(&format!("<p>{}<strong", "a".repeat(40))),
        "{html}"
    );
}

#[test]
fn transclusion_cycle_terminates() {
    let engine = engine();
    engine.create_template("A", "{{B}}", None).unwrap();
    engine.create_template("B", "{{A}}", None).unwrap();
    let html = html(&engine, "x {{A}} y");
    assert!(html.starts_with("<p>x "), "{html}");
    assert!(html.ends_with(" y</p>"), "{html}");
    assert!(html.contains("Template recursion depth exceeded"), "{html}");
}

#[test]
fn deep_nesting_hits_the_same_limit() {
    let _ = env_logger::try_init();
    let engine = Engine::new(Configuration {
        max_depth: 2,
        ..Configuration::default()
    });
    engine.create_template("One", "1{{Two}}", None).unwrap();
    engine.create_template("Two", "2{{Three}}", None).unwrap();
    engine.create_template("Three", "3", None).unwrap();
    assert_eq!(
        html(&engine, "{{One}}"),
        r#"<p>12<strong class="error">Template recursion depth exceeded: Three</strong></p>"#
    );
}

#[test]
fn bold_and_italic() {
    let engine = engine();
    assert_eq!(
        html(&engine, "'''''X'''''"),
        "<p><strong><em>X</em></strong></p>"
    );
    assert_eq!(html(&engine, "'''X'''"), "<p><strong>X</strong></p>");
    assert_eq!(html(&engine, "''X''"), "<p><em>X</em></p>");
    assert_eq!(
        html(&engine, "''''X''''"),
        "<p>'<strong>X'</strong></p>"
    );
    assert_eq!(
        html(&engine, "Bob's ''book''"),
        "<p>Bob's <em>book</em></p>"
    );
    assert_eq!(
        html(&engine, "'''''a''' b''"),
        "<p><strong><em>a</em></strong><em> b</em></p>"
    );
    assert_eq!(html(&engine, "'''open\nnext"), "<p><strong>open</strong>\nnext</p>");
}

#[test]
fn internal_links() {
    let engine = engine();
    assert_eq!(
        html(&engine, "[[Main Page]]"),
        r#"<p><a href="/wiki/Main_Page">Main Page</a></p>"#
    );
    assert_eq!(
        html(&engine, "[[Main Page|Home]]"),
        r#"<p><a href="/wiki/Main_Page">Home</a></p>"#
    );
    assert_eq!(html(&engine, "[[|X]]"), "<p>[[|X]]</p>");
    assert_eq!(
        html(&engine, "[[Page#Some Section]]"),
        r#"<p><a href="/wiki/Page#some-section">Page#Some Section</a></p>"#
    );
    assert_eq!(
        html(&engine, "[[File:A.png|pic]]"),
        r#"<p><a href="/wiki/File:A.png" class="internal-link file-link">pic</a></p>"#
    );
    assert_eq!(
        html(&engine, "[[:Category:Foo]]"),
        r#"<p><a href="/wiki/Category:Foo">Category:Foo</a></p>"#
    );
    assert_eq!(
        html(&engine, "[[A|''b'']]"),
        r#"<p><a href="/wiki/A"><em>b</em></a></p>"#
    );
}

#[test]
fn external_links() {
    let engine = engine();
    assert_eq!(
        html(&engine, "[https://example.com Example]"),
        r#"<p><a href="https://example.com" rel="nofollow noopener" target="_blank">Example</a></p>"#
    );
    assert_eq!(
        html(&engine, "[https://example.com/?a=1&b=2]"),
        r#"<p><a href="https://example.com/?a=1&amp;b=2" rel="nofollow noopener" target="_blank">https://example.com/?a=1&amp;b=2</a></p>"#
    );
}

#[test]
fn categories() {
    let engine = engine();
    let output = engine.render("[[Category:Foo]]", &RenderOptions::default());
    assert_eq!(output.html, "");
    assert_eq!(output.categories, ["Foo"]);

    let output = engine.render(
        "Text [[Category:Foo|sort key]] [[category: Bar]] [[Category:Foo]]",
        &RenderOptions::default(),
    );
    assert_eq!(output.html, "<p>Text</p>");
    assert_eq!(output.categories, ["Foo", "Bar"]);
}

#[test]
fn categories_disabled() {
    let _ = env_logger::try_init();
    let engine = Engine::new(Configuration {
        process_categories: false,
        ..Configuration::default()
    });
    let output = engine.render("[[Category:Foo]]", &RenderOptions::default());
    assert_eq!(output.html, "<p>[[Category:Foo]]</p>");
    assert!(output.categories.is_empty());
}

#[test]
fn table_of_contents() {
    let engine = engine();
    let output = engine.render("== A ==\n=== B ===", &RenderOptions::default());
    assert_eq!(output.table_of_contents.len(), 2);
    assert_eq!(
        output
            .table_of_contents
            .iter()
            .map(|entry| entry.level)
            .collect::<Vec<_>>(),
        [2, 3]
    );
    assert_eq!(
        output
            .table_of_contents
            .iter()
            .map(|entry| entry.id.as_str())
            .collect::<Vec<_>>(),
        ["a", "b"]
    );
    assert!(output.html.contains(r#"<h2 id="a">A</h2>"#), "{}", output.html);
    assert!(output.html.contains(r#"<h3 id="b">B</h3>"#), "{}", output.html);
    assert!(output.html.starts_with(r#"<details class="toc" open>"#));
}

#[test]
fn table_of_contents_placement() {
    let engine = engine();
    let output = engine.render("Intro\n\n== A ==\nBody", &RenderOptions::default());
    assert_eq!(
        output.html,
        concat!(
            "<p>Intro</p>\n",
            r##"<details class="toc" open><summary>Contents</summary><ul><li><a href="#a">A</a></li></ul></details>"##,
            "\n",
            r#"<h2 id="a">A</h2>"#,
            "\n<p>Body</p>"
        )
    );
}

#[test]
fn table_of_contents_switches() {
    let engine = engine();
    let output = engine.render("__NOTOC__\n== A ==\n== A ==", &RenderOptions::default());
    assert!(!output.html.contains("<details"), "{}", output.html);
    assert_eq!(
        output
            .table_of_contents
            .iter()
            .map(|entry| entry.id.as_str())
            .collect::<Vec<_>>(),
        ["a", "a-2"]
    );

    let engine = Engine::new(Configuration {
        toc_min_headings: 3,
        ..Configuration::default()
    });
    let output = engine.render("== A ==", &RenderOptions::default());
    assert!(!output.html.contains("<details"));
    let output = engine.render("__FORCETOC__ == A ==\n== A ==", &RenderOptions::default());
    assert!(output.html.contains("<details"));
}

#[test]
fn parser_functions() {
    let engine = engine();
    assert_eq!(html(&engine, "{{#if: |then|else}}"), "<p>else</p>");
    assert_eq!(html(&engine, "{{#if:0|then|else}}"), "<p>else</p>");
    assert_eq!(html(&engine, "{{#if: x |then|else}}"), "<p>then</p>");
    assert_eq!(html(&engine, "{{#if: x |then}}"), "<p>then</p>");
    assert_eq!(html(&engine, "{{#if: |then}}"), "");
    assert_eq!(
        html(&engine, "{{#switch:b|a=1|b=2|#default=9}}"),
        "<p>2</p>"
    );
    assert_eq!(
        html(&engine, "{{#switch:z|a=1|b=2|#default=9}}"),
        "<p>9</p>"
    );
    assert_eq!(html(&engine, "{{#switch:z|a=1|b=2}}"), "");
    assert_eq!(html(&engine, "{{#switch:c|a|c|d=4|9}}"), "<p>4</p>");
    assert_eq!(html(&engine, "{{#switch:q|a=1|9}}"), "<p>9</p>");
    assert_eq!(html(&engine, "{{#ifeq: a | a |yes|no}}"), "<p>yes</p>");
    assert_eq!(html(&engine, "{{#ifeq: a | b |yes|no}}"), "<p>no</p>");
    assert_eq!(html(&engine, "{{#expr: 1 + 2 * 3}}"), "<p>7</p>");
    assert_eq!(html(&engine, "{{#expr: (1 + 2) / 2}}"), "<p>1.5</p>");
    assert_eq!(html(&engine, "{{#ifexpr: 2 - 2 |yes|no}}"), "<p>no</p>");
    assert_eq!(html(&engine, "{{#time: Y | 2020-05-06 }}"), "<p>2020</p>");
    assert_eq!(
        html(&engine, "{{#if:{{#expr:1}}|{{#switch:x|x=nested}}}}"),
        "<p>nested</p>"
    );
}

#[test]
fn parser_function_errors() {
    let engine = engine();
    let html = html(&engine, "a {{#expr: 1/0}} b");
    assert!(html.starts_with(r#"<p>a <strong class="error">"#), "{html}");
    assert!(html.ends_with("</strong> b</p>"), "{html}");

    assert_eq!(
        self::html(&engine, "{{#iferror:{{#expr:1/0}}|bad|good}}"),
        "<p>bad</p>"
    );
    assert_eq!(
        self::html(&engine, "{{#iferror:{{#expr:1}}|bad|good}}"),
        "<p>good</p>"
    );
    assert_eq!(self::html(&engine, "{{#iferror:ok|bad}}"), "<p>ok</p>");
    assert_eq!(
        self::html(&engine, "{{#nope:x}}"),
        r#"<p><strong class="error">Unknown parser function: #nope</strong></p>"#
    );
    assert!(self::html(&engine, "{{#time: Y | garbage }}").contains(r#"class="error""#));
}

#[test]
fn evaluate_function() {
    let engine = engine();
    assert_eq!(engine.evaluate_function("#if", &["", "a", "b"]), "b");
    assert_eq!(engine.evaluate_function("if", &["1", "a", "b"]), "a");
    assert_eq!(
        engine.evaluate_function("#switch", &["x", "y=1", "x=2"]),
        "2"
    );
    assert_eq!(engine.evaluate_function("#expr", &["2*21"]), "42");
    assert!(engine.evaluate_function("#expr", &["2 +"]).contains(r#"class="error""#));
    assert!(
        engine
            .evaluate_function("#bogus", &[])
            .contains("Unknown parser function: #bogus")
    );
}

#[test]
fn unknown_template() {
    let engine = engine();
    assert_eq!(
        html(&engine, "{{DoesNotExist}}"),
        r#"<p><strong class="error">Template not found: DoesNotExist</strong></p>"#
    );
    assert!(
        html(&engine, "{{NOSUCHWORD}}")
            .contains(r#"<strong class="error">Unknown magic word: NOSUCHWORD</strong>"#)
    );
}

#[test]
fn template_parameters() {
    let engine = engine();
    engine
        .create_template("Greet", "Hello, {{{1|nobody}}}{{{punct|!}}}", None)
        .unwrap();
    assert_eq!(html(&engine, "{{Greet|World}}"), "<p>Hello, World!</p>");
    assert_eq!(html(&engine, "{{greet}}"), "<p>Hello, nobody!</p>");
    assert_eq!(
        html(&engine, "{{ greet | punct = ? |Bob}}"),
        "<p>Hello, Bob?</p>"
    );
    assert_eq!(
        html(&engine, "{{Greet|{{Greet|me}}}}"),
        "<p>Hello, Hello, me!!</p>"
    );
}

#[test]
fn caller_parameters() {
    let engine = engine();
    let options = RenderOptions {
        template_params: [("who".to_string(), "you".to_string())].into_iter().collect(),
        ..RenderOptions::default()
    };
    assert_eq!(
        engine.render("Hi {{{who}}} and {{{other|them}}}", &options).html,
        "<p>Hi you and them</p>"
    );
    assert_eq!(html(&engine, "{{{who}}}"), "<p>{{{who}}}</p>");
}

#[test]
fn builtin_templates() {
    let engine = engine();
    assert_eq!(html(&engine, "a{{!}}b{{=}}c"), "<p>a|b=c</p>");
    assert_eq!(
        html(&engine, "{{Clear}}"),
        r#"<div style="clear: both;"></div>"#
    );
    assert_eq!(
        html(&engine, "{{Template link|Foo bar}}"),
        r#"<p>&#123;&#123;<a href="/wiki/Template:Foo_bar">Foo bar</a>&#125;&#125;</p>"#
    );
}

#[test]
fn template_administration() {
    let engine = engine();
    engine.create_template("Note", "old", None).unwrap();
    assert_eq!(html(&engine, "{{Note}}"), "<p>old</p>");
    assert_eq!(engine.cache().len(), 1);

    engine.update_template("Note", "new", Some("A note")).unwrap();
    assert_eq!(engine.cache().len(), 0);
    assert_eq!(html(&engine, "{{Note}}"), "<p>new</p>");
    assert_eq!(
        engine.registry().get("note").unwrap().description.as_deref(),
        Some("A note")
    );

    assert!(engine.delete_template("Note").unwrap());
    assert!(!engine.delete_template("Note").unwrap());
    assert_eq!(
        html(&engine, "{{Note}}"),
        r#"<p><strong class="error">Template not found: Note</strong></p>"#
    );
}

#[test]
fn unknown_magic_word_invalidated_by_new_template() {
    let engine = engine();
    engine.create_template("Wrap", "[{{FOO}}]", None).unwrap();
    assert_eq!(
        html(&engine, "{{Wrap}}"),
        r#"<p>[<strong class="error">Unknown magic word: FOO</strong>]</p>"#
    );

    engine.create_template("FOO", "bar", None).unwrap();
    assert_eq!(html(&engine, "{{Wrap}}"), "<p>[bar]</p>");
}

#[test]
fn store_backed_templates() {
    let _ = env_logger::try_init();
    let db = Arc::new(MemoryDatabase::new());
    db.insert_template("Box", r#"<div class="box">{{{1}}}</div>"#, None);
    db.insert_page("main", "Main Page", "");
    let engine = Engine::with_sources(
        Configuration::default(),
        Some(db.clone()),
        Some(db.clone()),
    );

    assert_eq!(html(&engine, "{{Box|x}}"), r#"<div class="box">x</div>"#);

    // Edits made directly to the store are only seen once announced
    db.insert_template("Box", "<span>{{{1}}}</span>", None);
    assert_eq!(html(&engine, "{{Box|x}}"), r#"<div class="box">x</div>"#);
    assert_eq!(engine.template_changed("Box"), 1);
    assert_eq!(html(&engine, "{{Box|x}}"), "<p><span>x</span></p>");

    engine.create_template("Made", "made", None).unwrap();
    assert!(db.template_names().contains(&"made".to_string()));
    assert!(engine.delete_template("made").unwrap());
    assert!(!db.template_names().contains(&"made".to_string()));
}

#[test]
fn page_magic_words() {
    let _ = env_logger::try_init();
    let db = Arc::new(MemoryDatabase::new());
    db.insert_page("main", "Main Page", "Help");
    let engine = Engine::with_sources(Configuration::default(), None, Some(db.clone()));
    let options = RenderOptions {
        page: Some("main".into()),
        ..RenderOptions::default()
    };
    assert_eq!(
        engine.render("{{PAGENAME}}|{{FULLPAGENAME}}", &options).html,
        "<p>Main Page|Help:Main Page</p>"
    );
    assert_eq!(
        engine
            .render("{{PAGENAME}}", &RenderOptions::default())
            .html,
        ""
    );

    db.insert_page("main", "Renamed", "Help");
    assert_eq!(engine.page_changed("main"), 1);
    assert_eq!(
        engine.render("{{PAGENAME}}", &options).html,
        "<p>Renamed</p>"
    );
}

#[test]
fn dynamic_magic_words() {
    let engine = engine();
    let counter = Arc::new(AtomicUsize::new(0));
    let options = RenderOptions {
        magic_words: [(
            "COUNTER".to_string(),
            MagicWord::Dynamic(Arc::new({
                let counter = counter.clone();
                move || (counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
            })),
        )]
        .into_iter()
        .collect(),
        ..RenderOptions::default()
    };
    assert_eq!(engine.render("{{COUNTER}}", &options).html, "<p>1</p>");
    assert_eq!(engine.render("{{COUNTER}}", &options).html, "<p>2</p>");
    assert!(engine.cache().is_empty());
}

#[test]
fn preview() {
    let engine = engine();
    engine.create_template("Greet", "Hello", None).unwrap();
    assert_eq!(
        engine.render_preview("{{Greet}} {{#if:1|y}} [[Category:X]] '''b'''"),
        "<p>{{Greet}} {{#if:1|y}} [[Category:X]] <strong>b</strong></p>"
    );
    assert!(engine.cache().is_empty());
}

#[test]
fn paragraphs() {
    let engine = engine();
    assert_eq!(html(&engine, "a\nb\n\nc"), "<p>a\nb</p>\n<p>c</p>");
    assert_eq!(html(&engine, "a\n \nb"), "<p>a</p>\n<p>b</p>");
    assert_eq!(html(&engine, "a\n----\nb"), "<p>a</p>\n<hr>\n<p>b</p>");
    assert_eq!(html(&engine, "a<!-- hidden -->b"), "<p>ab</p>");
    assert_eq!(
        html(&engine, "<nowiki>''[[x]]''</nowiki>"),
        "<p>''[[x]]''</p>"
    );
}

#[test]
fn lists() {
    let engine = engine();
    assert_eq!(
        html(&engine, "* a\n* b\n** c\n# d"),
        "<ul><li>a</li><li>b<ul><li>c</li></ul></li></ul><ol><li>d</li></ol>"
    );
    assert_eq!(
        html(&engine, "; term : detail\n: more"),
        "<dl><dt>term</dt><dd>detail</dd><dd>more</dd></dl>"
    );
    assert_eq!(
        html(&engine, "before\n* [[A]]\nafter"),
        "<p>before</p>\n<ul><li><a href=\"/wiki/A\">A</a></li></ul>\n<p>after</p>"
    );
}

#[test]
fn tables() {
    let engine = engine();
    let text = "{| class=\"data\"\n|+ Caption\n|-\n! H1 !! H2\n|-\n| a || style=\"color: red\" | ''b''\n|}";
    assert_eq!(
        html(&engine, text),
        concat!(
            r#"<table class="wikitable data"><caption>Caption</caption>"#,
            "<tr><th>H1</th><th>H2</th></tr>",
            r#"<tr><td>a</td><td style="color: red"><em>b</em></td></tr></table>"#
        )
    );
    assert_eq!(
        html(&engine, "{|\n| unclosed"),
        r#"<table class="wikitable"><tr><td>unclosed</td></tr></table>"#
    );
}

#[test]
fn html_passthrough() {
    let engine = engine();
    assert_eq!(
        html(
            &engine,
            r#"<span onclick="x()" class="c">t</span><script>alert(1)</script>"#
        ),
        r#"<p><span class="c">t</span>&lt;script&gt;alert(1)&lt;/script&gt;</p>"#
    );
    assert_eq!(
        html(&engine, r#"<a href="javascript:alert(1)">x</a>"#),
        r#"<p>&lt;a href="javascript:alert(1)"&gt;x&lt;/a&gt;</p>"#
    );
    assert_eq!(html(&engine, "a<br/>b"), "<p>a<br>b</p>");

    let engine = Engine::new(Configuration {
        allow_html: false,
        ..Configuration::default()
    });
    assert_eq!(html(&engine, "<b>x</b>"), "<p>&lt;b&gt;x&lt;/b&gt;</p>");
}

#[test]
fn template_calls() {
    let engine = engine();
    let calls = engine.template_calls("{{A|x|k=v}} {{#if:1|{{B}}}}");
    assert_eq!(
        calls.iter().map(|call| call.name.as_str()).collect::<Vec<_>>(),
        ["A", "B"]
    );
    assert_eq!(calls[0].params.get("1").map(String::as_str), Some("x"));
    assert_eq!(calls[0].params.get("k").map(String::as_str), Some("v"));
}
