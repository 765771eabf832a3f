use url::Url;

/// Resolve a stored file reference to a download URL under `<base>/files/`.
///
/// The backend hands out references in several shapes (`/api/files/x.png`,
/// `uploads/avatars/x.png`, `x.png`); only the last path segment is the file
/// name. Returns `None` when there is no file name to link to.
pub fn file_url(base: &Url, path: &str) -> Option<Url> {
    let trimmed = path.trim_start_matches('/').trim();
    let file_name = trimmed.rsplit('/').next()?;
    if file_name.is_empty() {
        return None;
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push("files")
        .push(file_name);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Url {
        Url::parse("http://localhost:8080/api").unwrap()
    }

    fn resolved(path: &str) -> Option<String> {
        file_url(&base(), path).map(String::from)
    }

    #[test]
    fn accepts_every_reference_shape() {
        let expected = Some("http://localhost:8080/api/files/a1.png".to_string());
        assert_eq!(resolved("/api/files/a1.png"), expected);
        assert_eq!(resolved("uploads/avatars/a1.png"), expected);
        assert_eq!(resolved("a1.png"), expected);
        assert_eq!(resolved("//a1.png  "), expected);
    }

    #[test]
    fn encodes_file_name() {
        assert_eq!(
            resolved("uploads/my avatar#1.png"),
            Some("http://localhost:8080/api/files/my%20avatar%231.png".to_string())
        );
    }

    #[test]
    fn nothing_to_link() {
        assert_eq!(resolved(""), None);
        assert_eq!(resolved("   "), None);
        assert_eq!(resolved("///"), None);
        assert_eq!(resolved("uploads/avatars/"), None);
    }

    #[test]
    fn trailing_slash_on_base() {
        let base = Url::parse("https://blog.example.com/api/").unwrap();
        assert_eq!(
            file_url(&base, "x.jpg").map(String::from),
            Some("https://blog.example.com/api/files/x.jpg".to_string())
        );
    }
}
