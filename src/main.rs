mod age;
mod github;
mod stats;
mod svg;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use github::{Affiliation, CountMode, GithubClient};
use stats::Stats;
use std::time::{Duration, Instant};

const DARK_MODE_SVG: &str = "dark_mode.svg";
const LIGHT_MODE_SVG: &str = "light_mode.svg";

const OWNED: &[Affiliation] = &[Affiliation::Owner];
const ALL_AFFILIATIONS: &[Affiliation] = &[
    Affiliation::Owner,
    Affiliation::Collaborator,
    Affiliation::OrganizationMember,
];

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let username =
        std::env::var("USER_NAME").context("USER_NAME environment variable not set")?;
    let client = GithubClient::new()?;
    let birthdate = NaiveDate::from_ymd_opt(2002, 10, 6).context("invalid birthdate")?;

    println!("Calculation times:");

    let started = Instant::now();
    let identity = client.user_identity(&username).await?;
    report("account data", started.elapsed());
    log::debug!("resolved {username} to node id {}", identity.id);

    let started = Instant::now();
    let age = age::age_string(birthdate, Utc::now().date_naive());
    report("age calculation", started.elapsed());

    let started = Instant::now();
    let commits = client
        .commit_count(&username, identity.created_at, Utc::now())
        .await;
    report("commit count", started.elapsed());

    let started = Instant::now();
    let stars = client
        .repos_and_stars(&username, CountMode::Stars, OWNED, None)
        .await?;
    report("star counter", started.elapsed());

    let started = Instant::now();
    let repos = client
        .repos_and_stars(&username, CountMode::Repos, OWNED, None)
        .await?;
    report("repo counter", started.elapsed());

    let started = Instant::now();
    let contributed_repos = client
        .repos_and_stars(&username, CountMode::Repos, ALL_AFFILIATIONS, None)
        .await?;
    report("contrib counter", started.elapsed());

    let started = Instant::now();
    let followers = client.follower_count(&username).await?;
    report("follower counter", started.elapsed());

    let stats = Stats {
        age,
        commits,
        stars,
        repos,
        contributed_repos,
        followers,
    };

    svg::overwrite(DARK_MODE_SVG, &stats)?;
    svg::overwrite(LIGHT_MODE_SVG, &stats)?;

    let counters = client.counters();
    log::debug!("issued {} GraphQL queries: {counters:?}", counters.total());

    println!("✅ Finished updating your GitHub README stats!");

    Ok(())
}

/// One aligned report line: label left-justified in a 23-column field,
/// elapsed time right-justified in 12, seconds past the one-second mark.
fn report(name: &str, elapsed: Duration) {
    let label = format!("   {name}:");
    let secs = elapsed.as_secs_f64();
    let value = if secs > 1.0 {
        format!("{secs:.4} s ")
    } else {
        format!("{:.4} ms", secs * 1000.0)
    };
    println!("{label:<23}{value:>12}");
}
