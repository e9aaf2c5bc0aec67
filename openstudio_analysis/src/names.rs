//! Name folding helpers shared by the builder and the readers.

/// Machine name of a display name: lower case, trimmed, dashes and spaces folded to
/// underscores, doubled underscores collapsed.
///
/// ```
/// use openstudio_analysis::names::machine_name;
/// assert_eq!(machine_name(" Set Window-To-Wall Ratio "), "set_window_to_wall_ratio");
/// ```
pub fn machine_name(display_name: &str) -> String {
    let folded: String = display_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();
    collapse_underscores(&folded)
}

/// CamelCase to snake_case, for measure class names.
///
/// A run of capitals followed by a capitalized word is split before the word:
/// `XPathValue` becomes `x_path_value`.
pub fn to_underscore(class_name: &str) -> String {
    let chars: Vec<char> = class_name.trim().replace("::", "/").chars().collect();
    let mut res = String::with_capacity(chars.len() + 4);
    for (idx, c) in chars.iter().enumerate() {
        if c.is_uppercase() && idx > 0 {
            let prev = chars[idx - 1];
            let next_is_lower = chars.get(idx + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower)
            {
                res.push('_');
            }
        }
        if *c == '-' {
            res.push('_');
        } else {
            res.extend(c.to_lowercase());
        }
    }
    res
}

/// Key of a setting row: `Number of Samples` becomes `number_of_samples`.
pub fn snake_case(label: &str) -> String {
    let folded: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    collapse_underscores(&folded)
        .trim_matches('_')
        .to_string()
}

fn collapse_underscores(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '_' && res.ends_with('_') {
            continue;
        }
        res.push(c);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_names() {
        assert_eq!(machine_name("Set XPath - Value"), "set_xpath_value");
        assert_eq!(machine_name("Reduce Lighting Loads"), "reduce_lighting_loads");
    }

    #[test]
    fn class_names() {
        assert_eq!(
            to_underscore("SetWindowToWallRatioByFacade"),
            "set_window_to_wall_ratio_by_facade"
        );
        assert_eq!(to_underscore("SetXPathSingleUnitValue"), "set_x_path_single_unit_value");
        assert_eq!(to_underscore("Add2Zones"), "add2_zones");
        assert_eq!(to_underscore("already_snake"), "already_snake");
        assert_eq!(to_underscore("Some-Measure"), "some_measure");
    }

    #[test]
    fn setting_keys() {
        assert_eq!(snake_case("Spreadsheet Version"), "spreadsheet_version");
        assert_eq!(snake_case("AWS Tags"), "aws_tags");
        assert_eq!(snake_case("Max Queued Jobs "), "max_queued_jobs");
        assert_eq!(snake_case("Failed f(x) value"), "failed_f_x_value");
    }
}
