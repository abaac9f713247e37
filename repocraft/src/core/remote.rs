//! Remote URL display rules.

/// Drop any `user[:password]@` part from a URL-style remote.
///
/// scp-style remotes (`git@host:path`) and local paths are returned as-is;
/// their user part is an account name, not a secret.
pub fn strip_userinfo(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rfind('@') {
        Some(at) => format!("{scheme}://{}{tail}", &authority[at + 1..]),
        None => url.to_string(),
    }
}
