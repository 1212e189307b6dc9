/// The full value set handed to the SVG patcher, assembled once per run.
#[derive(Debug)]
pub struct Stats {
    pub age: String,
    pub commits: u64,
    pub stars: u64,
    pub repos: u64,
    pub contributed_repos: u64,
    pub followers: u64,
}
