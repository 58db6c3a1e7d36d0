//! Keeping credentials out of logs and CLI output.

/// Number of characters kept visible at each end of a masked secret.
const VISIBLE: usize = 3;

/// Mask a secret for display.
///
/// Keeps the first and last three characters; anything of six characters or
/// fewer is masked completely.
///
/// ```
/// use herald::utils::secret::mask_secret;
///
/// assert_eq!(mask_secret("SCT123456789"), "SCT******789");
/// assert_eq!(mask_secret("abc"), "***");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= VISIBLE * 2 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..VISIBLE].iter().collect();
    let tail: String = chars[chars.len() - VISIBLE..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - VISIBLE * 2), tail)
}
