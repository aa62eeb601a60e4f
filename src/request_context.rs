use url::form_urlencoded;

/// Resize intent carried by the query string of a derived-image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeParams {
    pub source_image: String,
    pub width: u32,
    pub height: Option<u32>,
    pub next_extension: String,
}

impl ResizeParams {
    /// Returns `None` when the query does not describe a resize: no positive
    /// `width`, or no `sourceImage`/`nextExtension` to act on.
    pub fn from_query(querystring: &str) -> Option<ResizeParams> {
        let mut source_image = None;
        let mut width = None;
        let mut height = None;
        let mut next_extension = None;

        for (key, value) in form_urlencoded::parse(querystring.as_bytes()) {
            let slot = match &*key {
                "sourceImage" => &mut source_image,
                "width" => &mut width,
                "height" => &mut height,
                "nextExtension" => &mut next_extension,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let width = width.as_deref().and_then(parse_dimension)?;
        let height = height.as_deref().and_then(parse_dimension);
        let source_image = source_image.filter(|s| !s.is_empty())?;
        let next_extension = next_extension.filter(|s| !s.is_empty())?;

        Some(ResizeParams {
            source_image,
            width,
            height,
            next_extension,
        })
    }

    pub fn source_key(&self) -> &str {
        strip_leading_slash(&self.source_image)
    }

    pub fn content_type(&self) -> String {
        format!("image/{}", self.next_extension)
    }
}

pub fn strip_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Leading-integer parse: skips leading whitespace, accepts a sign, then
/// reads base-10 digits up to the first non-digit. Only positive results
/// count as a dimension.
fn parse_dimension(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..digits_end];
    if digits.is_empty() || negative {
        return None;
    }
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(value) => Some(value),
    }
}
