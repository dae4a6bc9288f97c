//! Repository URL canonicalization
//!
//! Registry packages and community records refer to the same repository in
//! many spellings: raw-file links on any branch, `.git` clone URLs, trailing
//! slashes, mixed case. [`normalize`] reduces all of them to one identity
//! string so the two sources can be joined.

use url::Url;

/// Raw file host of the dominant forge
const RAW_HOST: &str = "raw.githubusercontent.com";

/// Raw file host for gists
const GIST_RAW_HOST: &str = "gist.githubusercontent.com";

const GITHUB_HOST: &str = "github.com";
const GIST_HOST: &str = "gist.github.com";

/// Namespace for packages synthesized from community data.
///
/// The fetch listing drops registry packages whose id falls under this
/// prefix, so synthetic ids never collide with primary packages.
pub const SYNTHETIC_PREFIX: &str = "community:";

/// Canonicalize a repository reference.
///
/// Raw-file links are folded back to the repository (or gist) they live in;
/// any other host keeps scheme, host, port and path with query and fragment
/// dropped. Input that is not an absolute URL comes back trimmed, lowercased
/// and suffix-stripped.
pub fn normalize(raw: &str) -> String {
    let mut url = raw.trim().to_lowercase();
    if let Some(stripped) = url.strip_suffix(".git") {
        url.truncate(stripped.len());
    }
    let url = url.trim_end_matches('/').to_string();

    let parsed = match Url::parse(&url) {
        Ok(parsed) => parsed,
        Err(_) => return url,
    };
    let host = match parsed.host_str() {
        Some(host) => host.to_string(),
        None => return url,
    };
    let segments = path_segments(&parsed);

    if segments.len() >= 2 {
        match host.as_str() {
            RAW_HOST => return format!("https://{}/{}/{}", GITHUB_HOST, segments[0], segments[1]),
            GIST_RAW_HOST => return format!("https://{}/{}/{}", GIST_HOST, segments[0], segments[1]),
            _ => {}
        }
    }

    let mut canonical = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        canonical.push_str(&format!(":{}", port));
    }
    canonical.push_str(parsed.path().trim_end_matches('/'));
    canonical
}

/// Derive the package id used for a community-only repository.
///
/// Expects an already normalized identity. Returns `None` for empty input.
pub fn synthetic_package_id(normalized: &str) -> Option<String> {
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return None;
    }

    let parsed = Url::parse(normalized).ok();
    let host = parsed.as_ref().and_then(|p| p.host_str().map(str::to_string));
    let (Some(parsed), Some(host)) = (parsed.as_ref(), host) else {
        return Some(format!("{}{}", SYNTHETIC_PREFIX, fold(normalized)));
    };
    let segments = path_segments(parsed);

    let body = match (host.as_str(), segments.as_slice()) {
        (GIST_HOST, [_, gist_id, ..]) => format!("gist_{}", fold(gist_id)),
        (GITHUB_HOST, [owner, repo, ..]) => format!("{}_{}", fold(owner), fold(repo)),
        (_, [owner, repo, ..]) => format!("{}_{}_{}", fold(&host), fold(owner), fold(repo)),
        _ => fold(&host),
    };
    Some(format!("{}{}", SYNTHETIC_PREFIX, body))
}

/// Whether the URL points at one of the forges the community map is known
/// to reference
pub fn is_supported_repo_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    ["github.com", "githubusercontent.com", "gitee.com", "gitlab.com", "codeberg.org"]
        .iter()
        .any(|forge| lower.contains(forge))
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Lowercase and collapse every run of non-alphanumeric characters to `_`
fn fold(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    let mut pending_sep = false;
    for ch in component.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}
