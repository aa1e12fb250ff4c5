use std::{io::Read as _, sync::Arc};
use wiki_render::{Configuration, Engine, MemoryDatabase, RenderOptions};

fn usage<T>(err: &'static str) -> anyhow::Result<T> {
    let exe = std::env::args().next().unwrap_or_default();
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("Usage: {exe} [options] [input.wiki]\n");
    println!("Reads Wikitext from the input file, or stdin if none is given, and");
    println!("writes the rendered HTML to stdout.\n");
    println!("Options:");
    println!("    --page <slug>: The slug of the page being rendered");
    println!("    --templates <dir>: Load `*.wiki` templates from this directory");
    println!("    --max-depth <n>: Maximum template transclusion depth (default: 40)");
    println!("    --no-html: Escape all HTML tags in the input");
    println!("    --preview: Render without expanding templates");
    println!("    --list-templates: List known templates and exit");
    println!("    --json: Write the full render output as JSON\n");
    Err(anyhow::Error::msg(err))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        return usage("Help requested");
    }

    let page = args.opt_value_from_str::<_, String>("--page")?;
    let templates = args.opt_value_from_str::<_, String>("--templates")?;
    let max_depth = args.opt_value_from_str::<_, usize>("--max-depth")?;
    let no_html = args.contains("--no-html");
    let preview = args.contains("--preview");
    let list_templates = args.contains("--list-templates");
    let json = args.contains("--json");
    let _ = args.contains("--");
    let input = args.opt_free_from_str::<String>()?;

    if !args.finish().is_empty() {
        return usage("Unknown extra arguments passed");
    }

    let mut config = Configuration::default();
    config.allow_html = !no_html;
    if let Some(max_depth) = max_depth {
        config.max_depth = max_depth;
    }

    let db = Arc::new(match &templates {
        Some(dir) => MemoryDatabase::from_dir(dir)?,
        None => MemoryDatabase::new(),
    });
    if let Some(page) = &page {
        db.insert_page(page, page.replace('_', " "), "");
    }
    let engine = Engine::with_sources(config, Some(db.clone()), Some(db.clone()));

    if list_templates {
        let mut names = engine.registry().list();
        names.extend(db.template_names());
        names.sort_unstable();
        names.dedup();
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let text = match &input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    if preview {
        println!("{}", engine.render_preview(&text));
        return Ok(());
    }

    let output = engine.render(
        &text,
        &RenderOptions {
            page,
            ..RenderOptions::default()
        },
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output.html);
    }
    log::debug!("Cache: {:?}", engine.cache_stats());
    Ok(())
}
