//! Cache key escaping for use as store keys.

use std::borrow::Cow;

/// Map a logical cache key to its store key.
///
/// Returns `None` for an absent key and the key unchanged when `skip_escape`
/// is set. Otherwise the key is form-urlencoded: spaces become `+` and
/// reserved characters are percent-encoded.
pub fn encode(path: Option<&str>, skip_escape: bool) -> Option<Cow<'_, str>> {
    let path = path?;
    if skip_escape {
        return Some(Cow::Borrowed(path));
    }
    Some(url::form_urlencoded::byte_serialize(path.as_bytes()).collect())
}
