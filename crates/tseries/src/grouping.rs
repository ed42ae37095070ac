//! Path-based grouping of history files into continuous timelines.
//!
//! Files are grouped by containing directory plus file name prefix, the
//! prefix being whatever remains after the trailing date token is removed.
//! How a name splits into prefix and token is a [`GroupingStrategy`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::collection::FileRecord;
use crate::error::TseriesError;

/// Sort key parsed from a date token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKey {
    /// year, month, day, seconds of day; missing parts are zero.
    Date(i64, u32, u32, u32),
    /// All-digit tokens that are not dates, e.g. `00042`.
    Index(u64),
}

/// Splits file names into a group prefix and an ordering token.
pub trait GroupingStrategy: Send + Sync {
    /// `(prefix, token)` for a file name, or `None` when the name carries no
    /// token (the file then forms its own group).
    fn split<'a>(&self, file_name: &'a str) -> Option<(&'a str, &'a str)>;

    /// Chronological key for a token, if it can be parsed.
    fn token_key(&self, token: &str) -> Option<TokenKey> {
        parse_date_token(token)
    }

    /// Key for a token read as a plain counter, used when the tokens of a
    /// group do not all parse as dates.
    fn counter_key(&self, token: &str) -> Option<TokenKey> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        token.parse().ok().map(TokenKey::Index)
    }
}

/// `<prefix><delim><token>.<ext>`, the CESM/E3SM history naming scheme.
#[derive(Debug, Clone)]
pub struct DelimitedDateToken {
    pub delimiter: char,
}

impl Default for DelimitedDateToken {
    fn default() -> Self {
        Self { delimiter: '.' }
    }
}

impl GroupingStrategy for DelimitedDateToken {
    fn split<'a>(&self, file_name: &'a str) -> Option<(&'a str, &'a str)> {
        let (stem, _ext) = file_name.rsplit_once('.')?;
        let (prefix, token) = stem.rsplit_once(self.delimiter)?;
        if prefix.is_empty() || token.is_empty() {
            return None;
        }
        Some((prefix, token))
    }
}

/// Parse `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DD-SSSSS`, `YYYYMM` and
/// `YYYYMMDD`. Other all-digit tokens become an index.
pub fn parse_date_token(token: &str) -> Option<TokenKey> {
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    let parts: Vec<&str> = token.split('-').collect();
    if parts.len() > 1 {
        if !parts.iter().all(|p| all_digits(p)) || parts[0].len() < 4 || parts.len() > 4 {
            return None;
        }
        let year: i64 = parts[0].parse().ok()?;
        let month: u32 = parts[1].parse().ok()?;
        let day: u32 = parts.get(2).map_or(Some(0), |d| d.parse().ok())?;
        let secs: u32 = parts.get(3).map_or(Some(0), |s| s.parse().ok())?;
        if !(1..=12).contains(&month) || day > 31 || secs >= 86_400 {
            return None;
        }
        return Some(TokenKey::Date(year, month, day, secs));
    }

    if !all_digits(token) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| token[range].parse::<u32>().ok();
    match token.len() {
        4 => Some(TokenKey::Date(token.parse().ok()?, 0, 0, 0)),
        6 => {
            let month = field(4..6)?;
            if !(1..=12).contains(&month) {
                return None;
            }
            Some(TokenKey::Date(token[..4].parse().ok()?, month, 0, 0))
        }
        8 => {
            let (month, day) = (field(4..6)?, field(6..8)?);
            if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
                return None;
            }
            Some(TokenKey::Date(token[..4].parse().ok()?, month, day, 0))
        }
        _ => token.parse().ok().map(TokenKey::Index),
    }
}

/// Identity of a group: directory plus file name prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub dir: PathBuf,
    pub prefix: String,
    /// False for singleton groups of files without a date token, whose
    /// prefix is the whole file name.
    pub dated: bool,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dated {
            write!(f, "{}/{}*", self.dir.display(), self.prefix)
        } else {
            write!(f, "{}/{}", self.dir.display(), self.prefix)
        }
    }
}

/// Files believed to form one continuous timeline, in time order.
#[derive(Debug, Clone)]
pub struct Group {
    pub key: GroupKey,
    pub members: Vec<FileRecord>,
    pub warnings: Vec<String>,
}

impl Group {
    /// Time-varying variables shared by every pulled member.
    ///
    /// Members whose variable set differs from the most common one are
    /// recorded in `warnings`.
    pub fn common_variables(&mut self) -> BTreeSet<String> {
        let sets: Vec<(&Path, &BTreeSet<String>)> = self
            .members
            .iter()
            .filter_map(|m| m.metadata().map(|meta| (m.path(), &meta.time_varying)))
            .collect();
        let Some((_, first)) = sets.first() else {
            return BTreeSet::new();
        };

        let mut counts: Vec<(&BTreeSet<String>, usize)> = Vec::new();
        for (_, set) in &sets {
            match counts.iter_mut().find(|(s, _)| s == set) {
                Some((_, n)) => *n += 1,
                None => counts.push((set, 1)),
            }
        }
        let majority = counts
            .iter()
            .fold((*first, 0), |best, &(s, n)| if n > best.1 { (s, n) } else { best })
            .0;

        let mut common = (**first).clone();
        for (path, set) in &sets {
            common.retain(|v| set.contains(v));
            if *set != majority {
                let message = format!(
                    "{} has a variable set inconsistent with group {}",
                    path.display(),
                    self.key
                );
                warn!(path = %path.display(), group = %self.key, "Inconsistent variable set");
                if !self.warnings.contains(&message) {
                    self.warnings.push(message);
                }
            }
        }
        common
    }
}

/// A group that could not be ordered safely.
#[derive(Debug)]
pub struct RejectedGroup {
    pub key: GroupKey,
    pub paths: Vec<PathBuf>,
    pub error: TseriesError,
}

/// Result of partitioning a collection.
#[derive(Debug, Default)]
pub struct Grouping {
    pub groups: Vec<Group>,
    pub rejected: Vec<RejectedGroup>,
}

/// Partition `records` into groups using `strategy`.
pub fn group_records<S>(records: &[FileRecord], strategy: &S) -> Grouping
where
    S: GroupingStrategy + ?Sized,
{
    let mut buckets: BTreeMap<GroupKey, Vec<(Option<String>, FileRecord)>> = BTreeMap::new();
    for record in records {
        let path = record.path();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (key, token) = match strategy.split(&name) {
            Some((prefix, token)) => (
                GroupKey {
                    dir,
                    prefix: prefix.to_string(),
                    dated: true,
                },
                Some(token.to_string()),
            ),
            None => (
                GroupKey {
                    dir,
                    prefix: name.clone(),
                    dated: false,
                },
                None,
            ),
        };
        buckets.entry(key).or_default().push((token, record.clone()));
    }

    let mut grouping = Grouping::default();
    for (key, members) in buckets {
        match order_members(&key, members, strategy) {
            Ok(members) => grouping.groups.push(Group {
                key,
                members,
                warnings: Vec::new(),
            }),
            Err((paths, error)) => {
                warn!(group = %key, error = %error, "Rejected group");
                grouping.rejected.push(RejectedGroup { key, paths, error });
            }
        }
    }
    grouping
}

type Rejection = (Vec<PathBuf>, TseriesError);

fn ambiguous(key: &GroupKey, members: &[(Option<String>, FileRecord)], reason: String) -> Rejection {
    let paths = members.iter().map(|(_, r)| r.path().to_path_buf()).collect();
    (
        paths,
        TseriesError::AmbiguousOrder {
            group: key.to_string(),
            reason,
        },
    )
}

fn order_members<S>(
    key: &GroupKey,
    mut members: Vec<(Option<String>, FileRecord)>,
    strategy: &S,
) -> std::result::Result<Vec<FileRecord>, Rejection>
where
    S: GroupingStrategy + ?Sized,
{
    if members.len() == 1 {
        return Ok(members.into_iter().map(|(_, r)| r).collect());
    }

    let keys = match group_keys(&members, strategy) {
        Ok(Some(keys)) => keys,
        Ok(None) => {
            members.sort_by(|a, b| a.0.cmp(&b.0));
            return Ok(members.into_iter().map(|(_, r)| r).collect());
        }
        Err(reason) => return Err(ambiguous(key, &members, reason)),
    };

    let mut seen: HashMap<TokenKey, &str> = HashMap::new();
    for ((token, _), k) in members.iter().zip(&keys) {
        let token = token.as_deref().unwrap_or_default();
        if let Some(other) = seen.insert(*k, token) {
            let reason = format!("tokens '{}' and '{}' denote the same time", other, token);
            return Err(ambiguous(key, &members, reason));
        }
    }

    let mut keyed: Vec<(TokenKey, FileRecord)> = keys
        .into_iter()
        .zip(members.into_iter().map(|(_, r)| r))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, r)| r).collect())
}

/// One key per member, all of the same kind.
///
/// Dates are used when every token parses as one. Otherwise, when every
/// token is a counter, all members are keyed by counter, so a run such as
/// `000001..000014` is not half read as `YYYYMM`. `Ok(None)` means no token
/// parses and members fall back to token string order.
fn group_keys<S>(
    members: &[(Option<String>, FileRecord)],
    strategy: &S,
) -> std::result::Result<Option<Vec<TokenKey>>, String>
where
    S: GroupingStrategy + ?Sized,
{
    let tokens: Vec<Option<&str>> = members.iter().map(|(t, _)| t.as_deref()).collect();
    let parsed: Vec<Option<TokenKey>> = tokens
        .iter()
        .map(|t| t.and_then(|t| strategy.token_key(t)))
        .collect();

    let all_dates = parsed.iter().all(|k| matches!(k, Some(TokenKey::Date(..))));
    if all_dates {
        return Ok(Some(parsed.into_iter().flatten().collect()));
    }
    let counters: Option<Vec<TokenKey>> = tokens
        .iter()
        .map(|t| t.and_then(|t| strategy.counter_key(t)))
        .collect();
    if let Some(counters) = counters {
        return Ok(Some(counters));
    }

    if parsed.iter().all(Option::is_none) {
        return Ok(None);
    }
    let dates = parsed.iter().filter(|k| matches!(k, Some(TokenKey::Date(..)))).count();
    Err(format!(
        "{} of {} tokens read as dates and the rest are not all counters",
        dates,
        members.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(paths: &[&str]) -> Vec<FileRecord> {
        paths.iter().map(|p| FileRecord::new(PathBuf::from(p))).collect()
    }

    fn member_names(group: &Group) -> Vec<String> {
        group
            .members
            .iter()
            .map(|m| m.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_split_tokens() {
        let s = DelimitedDateToken::default();
        assert_eq!(s.split("foo.h0.2000-01.nc"), Some(("foo.h0", "2000-01")));
        assert_eq!(s.split("testing.hf.00042.nc"), Some(("testing.hf", "00042")));
        assert_eq!(s.split("static.nc"), None);
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(parse_date_token("2000"), Some(TokenKey::Date(2000, 0, 0, 0)));
        assert_eq!(parse_date_token("2000-02"), Some(TokenKey::Date(2000, 2, 0, 0)));
        assert_eq!(
            parse_date_token("0001-01-02-21600"),
            Some(TokenKey::Date(1, 1, 2, 21600))
        );
        assert_eq!(parse_date_token("200003"), Some(TokenKey::Date(2000, 3, 0, 0)));
        assert_eq!(parse_date_token("20000315"), Some(TokenKey::Date(2000, 3, 15, 0)));
        assert_eq!(parse_date_token("00042"), Some(TokenKey::Index(42)));
        assert_eq!(parse_date_token("2000-13"), None);
        assert_eq!(parse_date_token("v2"), None);
    }

    #[test]
    fn test_groups_by_dir_and_prefix() {
        let grouping = group_records(
            &records(&[
                "/run/atm/foo.h0.2000-02.nc",
                "/run/atm/foo.h0.2000-01.nc",
                "/run/atm/foo.h1.2000-01-01.nc",
                "/run/lnd/foo.h0.2000-01.nc",
            ]),
            &DelimitedDateToken::default(),
        );
        assert!(grouping.rejected.is_empty());
        assert_eq!(grouping.groups.len(), 3);
        let h0 = grouping
            .groups
            .iter()
            .find(|g| g.key.dir == Path::new("/run/atm") && g.key.prefix == "foo.h0")
            .unwrap();
        assert_eq!(member_names(h0), vec!["foo.h0.2000-01.nc", "foo.h0.2000-02.nc"]);
    }

    #[test]
    fn test_chronological_order_across_token_lengths() {
        let grouping = group_records(
            &records(&["/run/a.h.100.nc", "/run/a.h.7.nc", "/run/a.h.99.nc"]),
            &DelimitedDateToken::default(),
        );
        let names = member_names(&grouping.groups[0]);
        assert_eq!(names, vec!["a.h.7.nc", "a.h.99.nc", "a.h.100.nc"]);
    }

    #[test]
    fn test_undated_file_is_singleton() {
        let grouping = group_records(
            &records(&["/run/static.nc", "/run/foo.h0.2000.nc"]),
            &DelimitedDateToken::default(),
        );
        assert_eq!(grouping.groups.len(), 2);
        assert!(grouping.groups.iter().any(|g| !g.key.dated));
    }

    #[test]
    fn test_unparseable_tokens_sort_lexicographically() {
        let grouping = group_records(
            &records(&["/run/x.h.beta.nc", "/run/x.h.alpha.nc"]),
            &DelimitedDateToken::default(),
        );
        assert_eq!(member_names(&grouping.groups[0]), vec!["x.h.alpha.nc", "x.h.beta.nc"]);
    }

    #[test]
    fn test_mixed_tokens_rejected() {
        let grouping = group_records(
            &records(&["/run/x.h.2000-01.nc", "/run/x.h.final.nc"]),
            &DelimitedDateToken::default(),
        );
        assert!(grouping.groups.is_empty());
        assert_eq!(grouping.rejected.len(), 1);
        assert!(matches!(
            grouping.rejected[0].error,
            TseriesError::AmbiguousOrder { .. }
        ));
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let grouping = group_records(
            &records(&["/run/x.h.2000-01.nc", "/run/x.h.200001.nc"]),
            &DelimitedDateToken::default(),
        );
        assert_eq!(grouping.rejected.len(), 1);
    }

    #[test]
    fn test_zero_padded_counters_order_as_counters() {
        let paths: Vec<String> = (1..=14).rev().map(|i| format!("/run/x.h.{:06}.nc", i)).collect();
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        let grouping = group_records(&records(&paths), &DelimitedDateToken::default());
        assert!(grouping.rejected.is_empty());
        assert_eq!(grouping.groups.len(), 1);
        let expected: Vec<String> = (1..=14).map(|i| format!("x.h.{:06}.nc", i)).collect();
        assert_eq!(member_names(&grouping.groups[0]), expected);
    }

    #[test]
    fn test_dates_and_counters_never_share_a_sort() {
        // "2000" alone is a year, "00042" is a counter; both read as counters.
        let grouping = group_records(
            &records(&["/run/x.h.2000.nc", "/run/x.h.00042.nc"]),
            &DelimitedDateToken::default(),
        );
        assert_eq!(member_names(&grouping.groups[0]), vec!["x.h.00042.nc", "x.h.2000.nc"]);

        let grouping = group_records(
            &records(&["/run/x.h.2000-01.nc", "/run/x.h.00042.nc"]),
            &DelimitedDateToken::default(),
        );
        assert!(grouping.groups.is_empty());
        assert_eq!(grouping.rejected.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let grouping = group_records(&[], &DelimitedDateToken::default());
        assert!(grouping.groups.is_empty());
        assert!(grouping.rejected.is_empty());
    }
}
