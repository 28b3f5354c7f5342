//! URL resolution and local file naming.

use url::Url;

use crate::error::{LocatorError, LocatorResult};

/// Number of trailing path segments kept by [`disambiguate_filename`].
const NAME_SEGMENTS: usize = 3;

/// Resolve a possibly-relative link against the URL of the page it appeared on.
pub fn resolve_url(base: &str, reference: &str) -> LocatorResult<Url> {
    let base = parse_url(base)?;
    resolve_against(&base, reference)
}

/// Resolve a link against an already parsed base URL.
pub fn resolve_against(base: &Url, reference: &str) -> LocatorResult<Url> {
    base.join(reference).map_err(|source| LocatorError::Parse {
        input: reference.to_owned(),
        source,
    })
}

/// Parse an absolute URL.
pub fn parse_url(input: &str) -> LocatorResult<Url> {
    Url::parse(input).map_err(|source| LocatorError::Parse {
        input: input.to_owned(),
        source,
    })
}

/// Derive a local file name from an archive download URL.
///
/// Archives from different test cases of one run share a basename, so the
/// last (up to) three path segments are joined with `-`:
/// `https://x/a/b/c/must-gather.tar` becomes `b-c-must-gather.tar`.
pub fn disambiguate_filename(url: &str) -> LocatorResult<String> {
    let url = parse_url(url)?;
    Ok(filename_for(&url))
}

pub(crate) fn filename_for(url: &Url) -> String {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let start = segments.len().saturating_sub(NAME_SEGMENTS);
    segments[start..].join("-")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolves_parent_reference() {
        let url = resolve_url("https://host/a/b/", "../c").unwrap();
        assert_eq!(url.as_str(), "https://host/a/c");
    }

    #[test]
    fn resolves_absolute_path_and_full_url() {
        let base = "https://gcsweb.example/gcs/bucket/logs/job/1/";
        assert_eq!(
            resolve_url(base, "/gcs/bucket/logs/job/1/artifacts/")
                .unwrap()
                .as_str(),
            "https://gcsweb.example/gcs/bucket/logs/job/1/artifacts/"
        );
        assert_eq!(
            resolve_url(base, "https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }

    #[test]
    fn rejects_invalid_base() {
        let err = resolve_url("not a url", "c").unwrap_err();
        assert!(matches!(err, LocatorError::Parse { ref input, .. } if input == "not a url"));
    }

    #[test]
    fn rejects_invalid_reference() {
        let err = resolve_url("https://host/", "https://[::1").unwrap_err();
        assert!(matches!(err, LocatorError::Parse { .. }));
    }

    #[test]
    fn filename_keeps_last_three_segments() {
        assert_eq!(
            disambiguate_filename("https://x/a/b/c/must-gather.tar").unwrap(),
            "b-c-must-gather.tar"
        );
        assert_eq!(
            disambiguate_filename("https://x/c/must-gather.tar").unwrap(),
            "c-must-gather.tar"
        );
        assert_eq!(
            disambiguate_filename("https://x/must-gather.tar").unwrap(),
            "must-gather.tar"
        );
    }

    #[test]
    fn filename_of_root_is_empty() {
        assert_eq!(disambiguate_filename("https://x/").unwrap(), "");
    }
}
