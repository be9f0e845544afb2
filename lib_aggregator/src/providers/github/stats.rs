//! # GitHub Statistics
//!
//! Wire types for the GitHub REST endpoints in use, the aggregates published
//! to readers, and the pure functions that turn one into the other. Nothing in
//! here performs I/O, so every summarization rule is unit tested directly.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::ResourceName;

/// Statistics window, in weeks. Serialized as the bare week count so JSON map
/// keys read `"1"`, `"4"`, `"12"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatRange(pub u8);

impl StatRange {
    pub const WEEK: StatRange = StatRange(1);
    pub const MONTH: StatRange = StatRange(4);
    pub const QUARTER: StatRange = StatRange(12);

    /// Every window reported.
    pub const ALL: [StatRange; 3] = [Self::WEEK, Self::MONTH, Self::QUARTER];

    pub fn weeks(self) -> usize {
        usize::from(self.0)
    }
}

/// The subset of a repository record that the aggregates need.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub stargazers_count: u64,
    /// Open issues *including* open pull requests, as GitHub reports it.
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub tags_url: String,
    #[serde(default)]
    pub archived: bool,
}

impl ResourceName for Repository {
    fn resource_name(&self) -> &str {
        &self.full_name
    }
}

/// Element of `GET /repos/{owner}/{repo}/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub login: String,
}

/// One week of `GET /repos/{owner}/{repo}/stats/contributors`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ContributorWeek {
    /// Commits in the week.
    #[serde(default)]
    pub c: u64,
}

/// Element of `GET /repos/{owner}/{repo}/stats/contributors`; weeks are
/// oldest first.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributorStats {
    pub author: Option<Author>,
    #[serde(default)]
    pub weeks: Vec<ContributorWeek>,
}

/// Element of `GET /repos/{owner}/{repo}/stats/commit_activity`; 52 weeks,
/// oldest first.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WeeklyCommits {
    #[serde(default)]
    pub total: u64,
}

/// Contributor activity summed over every repository of the organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContributionStats {
    pub commits: BTreeMap<StatRange, u64>,
    pub unique_contributors: BTreeMap<StatRange, u64>,
}

/// Commit volume and the number of repositories that saw any commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitActivity {
    pub commits: BTreeMap<StatRange, u64>,
    pub active_repositories: BTreeMap<StatRange, u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepoIssueCounts {
    pub open_issues: u64,
    pub open_pull_requests: u64,
}

/// Open issue and pull-request counts, total and per repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueStats {
    pub open_issues: u64,
    pub open_pull_requests: u64,
    pub repositories: BTreeMap<String, RepoIssueCounts>,
}

/// Stargazers per repository and their sum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stars {
    pub total: u64,
    pub repos: BTreeMap<String, u64>,
}

/// Sum of the last `weeks` entries of an oldest-first series.
fn tail_sum<T>(series: &[T], weeks: usize, value: impl Fn(&T) -> u64) -> u64 {
    let start = series.len().saturating_sub(weeks);
    series[start..].iter().map(value).sum()
}

/// One repository's share of [`ContributionStats`]: commits per window and
/// the logins that committed in that window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoContribution {
    pub commits: BTreeMap<StatRange, u64>,
    pub contributors: BTreeMap<StatRange, BTreeSet<String>>,
}

pub fn summarize_contributors(stats: &[ContributorStats]) -> RepoContribution {
    let mut out = RepoContribution::default();
    for range in StatRange::ALL {
        let mut commits = 0;
        let mut logins = BTreeSet::new();
        for contributor in stats {
            let count = tail_sum(&contributor.weeks, range.weeks(), |w| w.c);
            // Deleted accounts come back without an author: their commits
            // count, but they cannot be told apart as contributors.
            if let Some(author) = contributor.author.as_ref().filter(|_| count > 0) {
                logins.insert(author.login.clone());
            }
            commits += count;
        }
        out.commits.insert(range, commits);
        out.contributors.insert(range, logins);
    }
    out
}

/// Running merge of [`RepoContribution`]s. Contributors are de-duplicated
/// across repositories by login.
#[derive(Debug, Default)]
pub struct ContributionTally {
    commits: BTreeMap<StatRange, u64>,
    contributors: BTreeMap<StatRange, BTreeSet<String>>,
}

impl ContributionTally {
    pub fn merge(&mut self, repo: RepoContribution) {
        for (range, n) in repo.commits {
            *self.commits.entry(range).or_default() += n;
        }
        for (range, logins) in repo.contributors {
            self.contributors.entry(range).or_default().extend(logins);
        }
    }

    pub fn finish(self) -> ContributionStats {
        let mut stats = ContributionStats::default();
        for range in StatRange::ALL {
            stats.commits.insert(range, self.commits.get(&range).copied().unwrap_or(0));
            let unique = self.contributors.get(&range).map_or(0, |set| set.len() as u64);
            stats.unique_contributors.insert(range, unique);
        }
        stats
    }
}

/// Commits per window for one repository.
pub fn summarize_commit_activity(weeks: &[WeeklyCommits]) -> BTreeMap<StatRange, u64> {
    StatRange::ALL
        .into_iter()
        .map(|range| (range, tail_sum(weeks, range.weeks(), |w| w.total)))
        .collect()
}

impl CommitActivity {
    /// Folds one repository's per-window commit counts in.
    pub fn merge(&mut self, per_range: BTreeMap<StatRange, u64>) {
        for range in StatRange::ALL {
            let n = per_range.get(&range).copied().unwrap_or(0);
            *self.commits.entry(range).or_default() += n;
            *self.active_repositories.entry(range).or_default() += u64::from(n > 0);
        }
    }
}

impl IssueStats {
    pub fn merge(&mut self, (repo, counts): (String, RepoIssueCounts)) {
        self.open_issues += counts.open_issues;
        self.open_pull_requests += counts.open_pull_requests;
        self.repositories.insert(repo, counts);
    }
}

/// Splits GitHub's combined open count into issues and pull requests.
pub fn issue_counts(repo: &Repository, open_pull_requests: u64) -> RepoIssueCounts {
    RepoIssueCounts {
        open_issues: repo.open_issues_count.saturating_sub(open_pull_requests),
        open_pull_requests,
    }
}

pub fn stars(repos: &[Repository]) -> Stars {
    let repos: BTreeMap<String, u64> = repos.iter().map(|r| (r.name.clone(), r.stargazers_count)).collect();
    Stars {
        total: repos.values().sum(),
        repos,
    }
}
