//! Route naming: `NNN-` ordering prefixes, slugs, reserved segments and
//! artifact paths.
//!
//! Source files may carry an optional numeric prefix (`NNN-`) that controls
//! listing order but never appears in a URL:
//!
//! - `content/010-blog/002-hello.json` → `/blog/hello`
//! - `content/about/index.json` → `/about`
//! - `content/index.json` → `/`
//!
//! Every URL segment is slugified to lowercase ASCII. Segments that would
//! collide with engine-owned output files are rejected.

/// Output names the engine writes at the site root. A route may not claim them.
pub const RESERVED_SEGMENTS: &[&str] = &[
    "assets",
    "_headers",
    "_redirects",
    "sitemap.xml",
    "asset-manifest.json",
    "csp-report.json",
    "listings.json",
    "vercel.json",
    "robots.txt",
];

/// Result of parsing a numbered entry name like `020-my-post`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Number prefix if present (e.g., `20` from `020-my-post`)
    pub number: Option<u32>,
    /// Name part after `NNN-`. Empty if number-only. For unnumbered entries,
    /// this is the full input.
    pub name: String,
}

/// Parse an entry name following the `NNN-name` convention.
///
/// - `"020-my-post"` → number=Some(20), name="my-post"
/// - `"001"` → number=Some(1), name=""
/// - `"wip-drafts"` → number=None, name="wip-drafts"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if let Some(dash_pos) = name.find('-')
        && let Ok(num) = name[..dash_pos].parse::<u32>()
    {
        return ParsedName {
            number: Some(num),
            name: name[dash_pos + 1..].to_string(),
        };
    }
    if let Ok(num) = name.parse::<u32>() {
        return ParsedName {
            number: Some(num),
            name: String::new(),
        };
    }
    ParsedName {
        number: None,
        name: name.to_string(),
    }
}

fn fold_diacritic(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        'þ' => "th",
        _ => return None,
    })
}

/// Lowercase ASCII slug. Common Latin diacritics fold to their base letter;
/// every other run of non-alphanumeric characters becomes a single `-`.
///
/// - `"Über Uns"` → `"uber-uns"`
/// - `"  Hello, World!  "` → `"hello-world"`
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        let piece: Option<&str> = if c.is_ascii_alphanumeric() {
            None
        } else if let Some(folded) = fold_diacritic(c) {
            Some(folded)
        } else {
            pending_dash = true;
            continue;
        };
        if pending_dash && !out.is_empty() {
            out.push('-');
        }
        pending_dash = false;
        match piece {
            Some(folded) => out.push_str(folded),
            None => out.push(c),
        }
    }
    out
}

/// Why a route could not be derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeSegment {
    pub segment: String,
    pub reason: &'static str,
}

fn check_segment(raw: &str) -> Result<String, UnsafeSegment> {
    let unsafe_segment = |reason| UnsafeSegment {
        segment: raw.to_string(),
        reason,
    };
    if raw.starts_with('.') || raw.starts_with('_') {
        return Err(unsafe_segment("segments may not start with '.' or '_'"));
    }
    let slug = slugify(raw);
    let lowered = raw.to_lowercase();
    if RESERVED_SEGMENTS
        .iter()
        .any(|r| *r == lowered || *r == slug)
    {
        return Err(unsafe_segment("segment is reserved for engine output"));
    }
    if slug.is_empty() {
        return Err(unsafe_segment("segment has no URL-safe characters"));
    }
    Ok(slug)
}

/// Derive the route path for a page.
///
/// `slug` (from metadata) wins over `relative_id`, which is the document id
/// below the content namespace (`blog/002-hello`). A locale other than the
/// default prefixes the path.
pub fn route_path(
    relative_id: &str,
    slug: Option<&str>,
    locale: &str,
    default_locale: &str,
) -> Result<String, UnsafeSegment> {
    let mut segments = Vec::new();
    match slug {
        Some(slug) => {
            for raw in slug.split('/').filter(|s| !s.is_empty()) {
                segments.push(check_segment(raw)?);
            }
        }
        None => {
            let parts: Vec<&str> = relative_id.split('/').filter(|s| !s.is_empty()).collect();
            for (i, raw) in parts.iter().enumerate() {
                let stripped = parse_entry_name(raw).name;
                if i == parts.len() - 1 && stripped == "index" {
                    break;
                }
                segments.push(check_segment(&stripped)?);
            }
        }
    }
    if locale != default_locale {
        segments.insert(0, check_segment(locale)?);
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Normalize a user-written URL path (alias or redirect source) to route form.
pub fn normalize_url_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Output path for a route and file extension: `/` → `index.html`,
/// `/about` → `about/index.html`.
pub fn artifact_path(route_path: &str, extension: &str) -> String {
    let trimmed = route_path.trim_matches('/');
    if trimmed.is_empty() {
        format!("index.{extension}")
    } else {
        format!("{trimmed}/index.{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // parse_entry_name
    // =========================================================================

    #[test]
    fn numbered_with_multi_word_name() {
        let p = parse_entry_name("020-my-best-post");
        assert_eq!(p.number, Some(20));
        assert_eq!(p.name, "my-best-post");
    }

    #[test]
    fn number_only_no_dash() {
        let p = parse_entry_name("001");
        assert_eq!(p.number, Some(1));
        assert_eq!(p.name, "");
    }

    #[test]
    fn number_with_trailing_dash() {
        let p = parse_entry_name("001-");
        assert_eq!(p.number, Some(1));
        assert_eq!(p.name, "");
    }

    #[test]
    fn unnumbered_with_dashes() {
        let p = parse_entry_name("wip-drafts");
        assert_eq!(p.number, None);
        assert_eq!(p.name, "wip-drafts");
    }

    // =========================================================================
    // slugify
    // =========================================================================

    #[test]
    fn slugify_folds_diacritics() {
        assert_eq!(slugify("Über Uns"), "uber-uns");
        assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
        assert_eq!(slugify("Straße"), "strasse");
    }

    #[test]
    fn slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("--a--b--"), "a-b");
    }

    #[test]
    fn slugify_drops_non_latin_to_separator() {
        assert_eq!(slugify("日本 travel"), "travel");
        assert_eq!(slugify("日本"), "");
    }

    // =========================================================================
    // route_path
    // =========================================================================

    #[test]
    fn route_strips_prefixes_and_collapses_index() {
        assert_eq!(route_path("010-blog/002-hello", None, "en", "en").unwrap(), "/blog/hello");
        assert_eq!(route_path("about/index", None, "en", "en").unwrap(), "/about");
        assert_eq!(route_path("index", None, "en", "en").unwrap(), "/");
    }

    #[test]
    fn route_prefers_slug() {
        assert_eq!(
            route_path("blog/x", Some("/Über Uns/Team"), "en", "en").unwrap(),
            "/uber-uns/team"
        );
        assert_eq!(route_path("home", Some("/"), "en", "en").unwrap(), "/");
    }

    #[test]
    fn route_prefixes_non_default_locale() {
        assert_eq!(route_path("about", None, "fr", "en").unwrap(), "/fr/about");
        assert_eq!(route_path("index", None, "fr", "en").unwrap(), "/fr");
    }

    #[test]
    fn route_rejects_reserved_and_hidden_segments() {
        assert!(route_path("assets", None, "en", "en").is_err());
        assert!(route_path("x", Some("/sitemap.xml"), "en", "en").is_err());
        assert!(route_path("_drafts/post", None, "en", "en").is_err());
        assert!(route_path(".well-known", None, "en", "en").is_err());
        assert!(route_path("x", Some("/!!!"), "en", "en").is_err());
    }

    // =========================================================================
    // artifact_path / normalize_url_path
    // =========================================================================

    #[test]
    fn artifact_path_is_pure_function_of_route() {
        assert_eq!(artifact_path("/", "html"), "index.html");
        assert_eq!(artifact_path("/about", "html"), "about/index.html");
        assert_eq!(artifact_path("/blog/hello", "json"), "blog/hello/index.json");
    }

    #[test]
    fn normalize_url_path_trims_slashes() {
        assert_eq!(normalize_url_path("old/"), "/old");
        assert_eq!(normalize_url_path("/"), "/");
        assert_eq!(normalize_url_path(" /a/b/ "), "/a/b");
    }
}
