use std::{collections::BTreeMap, fmt::Write, path::PathBuf, sync::Arc};

use agora_client::{
    api::{CollectionPath, Forum, ForumId, Post, Store, Thread, ThreadId, ThreadRef},
    migrate_to_tree, store_ext, Aggregates, Config, PageRequest, UserCache,
};
use agora_memory_store::MemoryStore;
use anyhow::Context;

#[derive(structopt::StructOpt)]
struct Opt {
    /// JSON dump of the store, as a `{ "path": document }` map
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Copy legacy `threads/` and `posts/` documents into the forum tree
    Migrate {
        #[structopt(short, long, parse(from_os_str))]
        output: PathBuf,
    },

    /// Re-derive post counts and last-activity pointers of every forum
    Repair {
        #[structopt(short, long, parse(from_os_str))]
        output: PathBuf,
    },

    /// Print one page of a thread
    ShowPage {
        forum: String,
        thread: String,

        /// 0-based page index
        #[structopt(short, long, default_value = "0")]
        page: usize,
    },
}

fn load(path: &PathBuf) -> anyhow::Result<Arc<MemoryStore>> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading dump {path:?}"))?;
    let dump: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&data).with_context(|| format!("parsing dump {path:?}"))?;
    let store = MemoryStore::from_dump(dump).with_context(|| format!("loading dump {path:?}"))?;
    Ok(Arc::new(store))
}

fn save(store: &MemoryStore, path: &PathBuf) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(&store.dump()).context("serializing dump")?;
    std::fs::write(path, data).with_context(|| format!("writing dump {path:?}"))
}

async fn repair(store: Arc<MemoryStore>, config: Config) -> anyhow::Result<String> {
    let forums = store_ext::list_records::<Forum>(&*store, &CollectionPath::forums())
        .await
        .context("listing forums")?;
    let aggregates = Aggregates::new(store, config);
    let mut out = String::new();
    for forum in forums {
        let failed = aggregates
            .repair_forum(&forum.id)
            .await
            .with_context(|| format!("repairing forum {}", forum.id))?;
        for f in &failed {
            tracing::warn!(op = ?f.op, err = ?f.error, "repair step failed");
        }
        writeln!(out, "{}: {} failed steps", forum.id, failed.len())?;
    }
    Ok(out)
}

async fn show_page(
    store: Arc<MemoryStore>,
    config: Config,
    at: ThreadRef,
    index: usize,
) -> anyhow::Result<String> {
    let thread: Thread = store_ext::get_record(&*store, &at.path())
        .await
        .with_context(|| format!("reading thread {at}"))?
        .with_context(|| format!("no thread at {at}"))?;
    let page = PageRequest {
        index,
        size: config.posts_per_page,
    }
    .apply(&thread.post_ids);

    let mut posts = Vec::with_capacity(page.window.len());
    for (pos, id) in page.entries() {
        let at = at.post(id.clone());
        match store_ext::get_record::<Post>(&*store, &at.path()).await {
            Ok(Some(post)) => posts.push((pos, post)),
            Ok(None) => tracing::warn!(post = %at, "listed post is missing"),
            Err(err) => tracing::warn!(?err, post = %at, "skipping unreadable post"),
        }
    }
    let users = UserCache::new(store.clone())
        .resolve_many(posts.iter().map(|(_, p)| p.uid.clone()))
        .await;

    let mut out = String::new();
    writeln!(out, "{} (page {}/{})", thread.title, index + 1, page.total_pages.max(1))?;
    for (pos, post) in posts {
        let author = users
            .get(&post.uid)
            .map(|u| u.display_name.as_str())
            .unwrap_or("?");
        writeln!(out, "#{} {author} at {}", pos + 1, post.created_time.to_rfc3339())?;
        writeln!(out, "{}", post.content)?;
    }
    Ok(out)
}

async fn run(opt: Opt, config: Config) -> anyhow::Result<String> {
    let store = load(&opt.input)?;
    match opt.cmd {
        Command::Migrate { output } => {
            let report = migrate_to_tree(store.clone(), config).await?;
            save(&store, &output)?;
            let mut out = format!(
                "migrated {} threads and {} posts\n",
                report.threads, report.posts
            );
            for (path, why) in report.skipped {
                writeln!(out, "skipped {path}: {why}")?;
            }
            Ok(out)
        }
        Command::Repair { output } => {
            let out = repair(store.clone(), config).await?;
            save(&store, &output)?;
            Ok(out)
        }
        Command::ShowPage { forum, thread, page } => {
            let at = ThreadRef::new(ForumId::from(forum), ThreadId::from(thread));
            show_page(store, config, at, page).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let config = Config::from_env()?;
    print!("{}", run(opt, config).await?);
    Ok(())
}
