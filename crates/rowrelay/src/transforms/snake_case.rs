//! 🐍 snake_case: because the remote API wants `full_name`, and the spreadsheet said `Full Name`.
//!
//! Word boundaries, in order of appearance:
//! - any non-alphanumeric character (space, `-`, `.`, `_`) ends a word and is dropped
//! - lowercase or digit followed by uppercase: `fullName` → `full|Name`
//! - an acronym run followed by a capitalized word: `HTTPServer` → `HTTP|Server`
//!
//! Digits stick to the word they touch: `address2` stays `address2`.

/// 🔄 Rewrite `key` into lowercase words joined by `_`.
pub(crate) fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if !current.is_empty() && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let camel_hump = prev.is_lowercase() || prev.is_ascii_digit();
            let acronym_end = prev.is_uppercase() && next_is_lower;
            if camel_hump || acronym_end {
                words.push(std::mem::take(&mut current));
            }
        }

        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_camels_become_snakes() {
        assert_eq!(to_snake_case("fullName"), "full_name");
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("FirstName"), "first_name");
    }

    #[test]
    fn the_one_where_spaces_and_friends_are_separators() {
        assert_eq!(to_snake_case("Full Name"), "full_name");
        assert_eq!(to_snake_case("plan-tier"), "plan_tier");
        assert_eq!(to_snake_case("billing.address"), "billing_address");
        assert_eq!(to_snake_case("  padded   key  "), "padded_key");
        assert_eq!(to_snake_case("name__first"), "name_first");
    }

    #[test]
    fn the_one_where_acronyms_keep_their_dignity() {
        assert_eq!(to_snake_case("userID"), "user_id");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("parseURLQuick"), "parse_url_quick");
    }

    #[test]
    fn the_one_where_digits_stay_with_their_word() {
        assert_eq!(to_snake_case("address2"), "address2");
        assert_eq!(to_snake_case("version2Beta"), "version2_beta");
        assert_eq!(to_snake_case("tags_0"), "tags_0");
    }

    #[test]
    fn the_one_where_already_snake_is_left_alone() {
        assert_eq!(to_snake_case("name_first"), "name_first");
        assert_eq!(to_snake_case("id"), "id");
        assert_eq!(to_snake_case(""), "");
    }
}
