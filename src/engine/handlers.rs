//! Per-command handlers: fetch through the client, print to stdout.

use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::time::Duration;

use crate::active::{find_active, ActiveQuery};
use crate::client::Client;
use crate::core::{CancelToken, Clock, SystemClock};
use crate::engine::arg_parser::ListArgs;
use crate::engine::cli::Opts;
use crate::engine::render::{clean_text, format_age, TreeWriter, ITEM_LINK_PREFIX};
use crate::types::{Id, Item};
use crate::utils::{create_counter, finish_bar, refresh_bar, update_progress_bar};

/// Wrap-around width from the environment; 0 disables wrapping.
fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

pub fn handle_list(
    client: &Client,
    token: &CancelToken,
    opts: &Opts,
    mut ids: Vec<Id>,
    args: &ListArgs,
) -> Result<()> {
    if let Some(limit) = args.limit {
        ids.truncate(limit);
    }

    let out = std::io::stdout().lock();
    let mut writer = BufWriter::new(out);

    if args.ids {
        for id in ids {
            writeln!(writer, "{id}")?;
        }
        return writer.flush().context("failed to write output");
    }

    write_items_ordered(client, token, opts, ids, &mut writer)?;
    writer.flush().context("failed to write output")
}

pub fn handle_items(
    client: &Client,
    token: &CancelToken,
    opts: &Opts,
    ids: Vec<Id>,
) -> Result<()> {
    let out = std::io::stdout().lock();
    let mut writer = BufWriter::new(out);

    write_items_ordered(client, token, opts, ids, &mut writer)?;
    writer.flush().context("failed to write output")
}

/// Stream items in the order of `ids`, one line each.
fn write_items_ordered(
    client: &Client,
    token: &CancelToken,
    opts: &Opts,
    ids: Vec<Id>,
    writer: &mut dyn Write,
) -> Result<()> {
    let now = SystemClock.now();

    client.search_ordered(token, ids, |_, item| {
        if opts.json {
            serde_json::to_writer(&mut *writer, &*item)?;
            writeln!(writer)?;
        } else {
            write_item_line(writer, &item, now)?;
        }
        Ok((true, Vec::new()))
    })
}

fn write_item_line(writer: &mut dyn Write, item: &Item, now: std::time::SystemTime) -> Result<()> {
    let age = now.duration_since(item.created()).unwrap_or(Duration::ZERO);

    let text = if item.dead {
        "[dead]".to_string()
    } else if item.deleted {
        "[deleted]".to_string()
    } else if !item.title.is_empty() {
        clean_text(&item.title)
    } else {
        clean_text(&item.text)
    };

    writeln!(
        writer,
        "{}{} {:>6} {:<16} {}",
        ITEM_LINK_PREFIX,
        item.id,
        format_age(age),
        item.by,
        text
    )?;

    Ok(())
}

pub fn handle_user(
    client: &Client,
    token: &CancelToken,
    opts: &Opts,
    name: &str,
    submitted: bool,
    limit: Option<usize>,
) -> Result<()> {
    let user = client
        .user(token, name)
        .context("failed to retrieve user")?;

    if submitted {
        let mut ids = user.submitted;
        if let Some(limit) = limit {
            ids.truncate(limit);
        }

        let out = std::io::stdout().lock();
        let mut writer = BufWriter::new(out);
        write_items_ordered(client, token, opts, ids, &mut writer)?;
        return writer.flush().context("failed to write output");
    }

    if limit.is_some() {
        anyhow::bail!("--limit requires --submitted");
    }

    if opts.json {
        println!("{}", serde_json::to_string(&user)?);
    } else {
        println!("user:    {}", user.id);
        println!("karma:   {}", user.karma);
        println!("created: {}", user.created);
        if !user.about.is_empty() {
            println!("about:   {}", clean_text(&user.about));
        }
        println!("items:   {}", user.submitted.len());
    }

    Ok(())
}

pub fn handle_max(client: &Client, token: &CancelToken) -> Result<()> {
    let max_id = client.max_item(token)?;
    println!("{max_id}");
    Ok(())
}

pub fn handle_active(
    client: &Client,
    token: &CancelToken,
    opts: &Opts,
    window: Duration,
    max_age: Duration,
    min_by: usize,
    limit: usize,
) -> Result<()> {
    let query = ActiveQuery {
        window,
        max_age,
        min_authors: min_by,
        limit,
    };

    let bar = opts.verbose.then(|| create_counter("scanning"));
    if let Some(bar) = &bar {
        refresh_bar(bar);
    }

    let clock = SystemClock;
    let discussions = find_active(client, token, &clock, &query, |_| {
        if let Some(bar) = &bar {
            update_progress_bar(bar, 1);
        }
    })?;

    if let Some(bar) = &bar {
        finish_bar(bar);
    }

    let out = std::io::stdout().lock();
    let mut writer = BufWriter::new(out);

    if opts.json {
        for root in &discussions.roots {
            serde_json::to_writer(&mut writer, &**root)?;
            writeln!(writer)?;
        }
        return writer.flush().context("failed to write output");
    }

    let mut tree = TreeWriter::new(
        discussions.now,
        discussions.active_after,
        opts.color,
        terminal_width(),
    );

    for root in &discussions.roots {
        tree.write_tree(root, &discussions.by_parent);
    }

    tree.write_to(&mut writer)
        .context("failed to write output")?;
    writer.flush().context("failed to write output")
}
