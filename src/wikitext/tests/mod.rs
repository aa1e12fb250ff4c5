use super::*;

/// Returns the text of `span`.
fn slice(source: &str, span: Span) -> &str {
    &source[span.into_range()]
}

/// Converts a token stream into a compact, comparable description.
fn describe(source: &str, tokens: &[Spanned<Token>]) -> Vec<String> {
    tokens
        .iter()
        .map(|token| match &token.node {
            Token::BehaviorSwitch { name } => format!("Switch({})", slice(source, *name)),
            Token::Comment => "Comment".into(),
            Token::ExternalLink { target, content } => format!(
                "ExtLink({}{})",
                slice(source, *target),
                describe_content(source, content.as_deref())
            ),
            Token::Heading { level, content } => format!(
                "H{}({})",
                u8::from(*level),
                describe(source, content).join(",")
            ),
            Token::HorizontalRule => "Rule".into(),
            Token::HtmlTag(tag) => {
                let attrs = tag
                    .attributes
                    .iter()
                    .map(|(k, v)| format!(" {k}={v}"))
                    .collect::<String>();
                let slash = if tag.closing { "/" } else { "" };
                let self_closing = if tag.self_closing { "/" } else { "" };
                format!("<{slash}{}{attrs}{self_closing}>", tag.name)
            }
            Token::Link { target, content } => format!(
                "Link({}{})",
                slice(source, *target),
                describe_content(source, content.as_deref())
            ),
            Token::ListItem {
                kind,
                level,
                content,
            } => format!("{kind:?}{level}({})", slice(source, *content)),
            Token::MagicWord { name } => format!("Magic({})", slice(source, *name)),
            Token::NewLine => "NewLine".into(),
            Token::NoWiki { content } => format!("NoWiki({})", slice(source, *content)),
            Token::ParserFunction { name, arguments } => {
                let args = arguments
                    .iter()
                    .map(|arg| slice(source, *arg))
                    .collect::<Vec<_>>()
                    .join("|");
                format!("#{name}({args})")
            }
            Token::TableCaption => "Caption".into(),
            Token::TableCell { header: true } => "Th".into(),
            Token::TableCell { header: false } => "Td".into(),
            Token::TableEnd => "TableEnd".into(),
            Token::TableRow { attributes } => format!("Tr({})", slice(source, *attributes)),
            Token::TableStart { attributes } => {
                format!("Table({})", slice(source, *attributes))
            }
            Token::Template { name, arguments } => {
                let args = arguments
                    .iter()
                    .map(|arg| match arg.name {
                        Some(name) => {
                            format!("|{}={}", slice(source, name), slice(source, arg.value))
                        }
                        None => format!("|{}", slice(source, arg.value)),
                    })
                    .collect::<String>();
                format!("T({}{args})", slice(source, *name))
            }
            Token::Text => format!("Text({})", slice(source, token.span)),
        })
        .collect()
}

fn describe_content(source: &str, content: Option<&[Spanned<Token>]>) -> String {
    content.map_or_else(String::new, |content| {
        format!("|{}", describe(source, content).join(","))
    })
}

#[track_caller]
fn check(source: &str, expected: &[&str]) {
    let _ = env_logger::try_init();
    let tokens = tokenize(source);
    assert_eq!(describe(source, &tokens), expected, "source: {source:?}");
}

#[test]
fn plain_text() {
    check("hello world", &["Text(hello world)"]);
    check("", &[]);
}

#[test]
fn heading() {
    check("== Title ==\ntext", &["H2(Text(Title))", "NewLine", "Text(text)"]);
    check("= A =  ", &["H1(Text(A))"]);
}

#[test]
fn heading_uneven() {
    check("=== A ==", &["H2(Text(= A))"]);
    check("== A ===", &["H2(Text(A =))"]);
}

#[test]
fn heading_invalid() {
    check("== A == x", &["Text(== A == x)"]);
    check("====", &["Text(====)"]);
    check("x == A ==", &["Text(x == A ==)"]);
}

#[test]
fn heading_with_markup() {
    check("== [[A]] ==", &["H2(Link(A))"]);
}

#[test]
fn link() {
    check("[[Foo bar|baz]]", &["Link(Foo bar|Text(baz))"]);
    check("a [[ Foo ]] b", &["Text(a )", "Link(Foo)", "Text( b)"]);
}

#[test]
fn link_invalid() {
    check("[[|x]]", &["Text([[|x]])"]);
    check("[[a", &["Text([[a)"]);
    check("[[a\nb]]", &["Text([[a)", "NewLine", "Text(b]])"]);
}

#[test]
fn link_pipe_in_template() {
    check("[[A|{{b|c}}]]", &["Link(A|T(b|c))"]);
}

#[test]
fn external_link() {
    check(
        "[https://example.com Example site]",
        &["ExtLink(https://example.com|Text(Example site))"],
    );
    check("[http://example.com]", &["ExtLink(http://example.com)"]);
    check("[foo]", &["Text([foo])"]);
    check("[https://]", &["Text([https://])"]);
}

#[test]
fn template() {
    check("{{T|a|k = v}}", &["T(T|a|k=v)"]);
    check("x {{ Name }} y", &["Text(x )", "T(Name)", "Text( y)"]);
}

#[test]
fn template_positional_value_is_raw() {
    check("{{T| a }}", &["T(T| a )"]);
}

#[test]
fn template_unclosed() {
    check("{{T|a", &["Text({{T|a)"]);
    check("{{}}", &["Text({{}})"]);
}

#[test]
fn literal_parameter() {
    check("a {{{1|b}}} c", &["Text(a {{{1|b}}} c)"]);
}

#[test]
fn parser_function() {
    check("{{#if: x | y }}", &["#if( x | y )"]);
    check("{{#IfEq:a|b|c|d}}", &["#ifeq(a|b|c|d)"]);
}

#[test]
fn magic_word() {
    check("{{PAGENAME}}", &["Magic(PAGENAME)"]);
    check("{{CURRENTYEAR }}", &["Magic(CURRENTYEAR)"]);
    check("{{Pagename}}", &["T(Pagename)"]);
}

#[test]
fn list() {
    check(
        "* a\n** b\n# c\n; d\n: e",
        &[
            "Bullet1(a)",
            "NewLine",
            "Bullet2(b)",
            "NewLine",
            "Number1(c)",
            "NewLine",
            "Definition1(d)",
            "NewLine",
            "Indent1(e)",
        ],
    );
}

#[test]
fn list_not_at_line_start() {
    check("a * b", &["Text(a * b)"]);
}

#[test]
fn table() {
    check(
        "{| class=\"x\"\n|+ Cap\n|-\n! H1 !! H2\n|-\n| a || b\n|}",
        &[
            "Table( class=\"x\")",
            "NewLine",
            "Caption",
            "Text( Cap)",
            "NewLine",
            "Tr()",
            "NewLine",
            "Th",
            "Text( H1 )",
            "Th",
            "Text( H2)",
            "NewLine",
            "Tr()",
            "NewLine",
            "Td",
            "Text( a )",
            "Td",
            "Text( b)",
            "NewLine",
            "TableEnd",
        ],
    );
}

#[test]
fn table_markers_outside_table() {
    check("| a || b\n! c", &["Text(| a || b)", "NewLine", "Text(! c)"]);
}

#[test]
fn comment() {
    check("a<!-- x -->b", &["Text(a)", "Comment", "Text(b)"]);
    check("a<!-- x", &["Text(a)", "Comment"]);
}

#[test]
fn nowiki() {
    check(
        "<nowiki>''c'' {{T}}</nowiki>!",
        &["NoWiki(''c'' {{T}})", "Text(!)"],
    );
    check("a<nowiki/>b", &["Text(a)", "NoWiki()", "Text(b)"]);
    check("<NOWIKI>x</NoWiki>", &["NoWiki(x)"]);
}

#[test]
fn html_tags() {
    check(
        "<span class=\"x y\" id=z>t</span><br/>",
        &[
            "<span class=x y id=z>",
            "Text(t)",
            "</span>",
            "<br/>",
        ],
    );
    check("a < b", &["Text(a < b)"]);
    check("<b", &["Text(<b)"]);
}

#[test]
fn horizontal_rule() {
    check("----\na", &["Rule", "NewLine", "Text(a)"]);
    check("a----", &["Text(a----)"]);
}

#[test]
fn behavior_switch() {
    check("__NOTOC__", &["Switch(NOTOC)"]);
    check("__FOO__", &["Text(__FOO__)"]);
}

#[test]
fn inline_spans_are_absolute() {
    let source = "xx [[a]]";
    let tokens = tokenize_inline(source, Span::new(3, source.len()));
    assert_eq!(describe(source, &tokens), ["Link(a)"]);
    assert_eq!(tokens[0].span, Span::new(3, 8));
}

#[test]
fn inline_disables_line_constructs() {
    let source = "* a\n== b ==";
    let tokens = tokenize_inline(source, Span::new(0, source.len()));
    assert_eq!(
        describe(source, &tokens),
        ["Text(* a)", "NewLine", "Text(== b ==)"]
    );
}

#[test]
fn pathological() {
    for source in [
        "{".repeat(30),
        "}".repeat(30),
        "!".repeat(30),
        "[".repeat(30),
        "{|".repeat(30),
        "<".repeat(30),
        "=".repeat(30),
        "{{a|".repeat(30),
        "[[a|".repeat(30),
    ] {
        let tokens = tokenize(&source);
        let end = tokens.last().map_or(0, |token| token.span.end);
        assert_eq!(end, source.len(), "source: {source:?}");
    }
}

#[test]
fn large_unclosed_input() {
    let _ = env_logger::try_init();
    for source in [
        "{{a|".repeat(50_000),
        "{{{a|".repeat(50_000),
        "{{a|{{b}}".repeat(20_000),
        "{".repeat(100_000),
    ] {
        let tokens = tokenize(&source);
        let end = tokens.last().map_or(0, |token| token.span.end);
        assert_eq!(end, source.len());
    }

    let source = format!("{}{{{{T}}}}", "{{a|".repeat(50_000));
    let tokens = tokenize(&source);
    assert_eq!(describe(&source, &tokens[tokens.len() - 1..]), ["T(T)"]);
}

#[test]
fn multibyte_text() {
    check("é [[ü]] ∑", &["Text(é )", "Link(ü)", "Text( ∑)"]);
}
