// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

/// The short forms accepted for an exit direction, e.g. `n` for `north`.
///
/// Unknown directions have no abbreviations; the full direction word still
/// matches case-insensitively.
pub fn direction_abbreviations(direction: &str) -> &'static [&'static str] {
    match direction.to_lowercase().as_str() {
        "north" => &["n"],
        "south" => &["s"],
        "east" => &["e"],
        "west" => &["w"],
        "northeast" => &["ne"],
        "northwest" => &["nw"],
        "southeast" => &["se"],
        "southwest" => &["sw"],
        "up" => &["u"],
        "down" => &["d"],
        "out" => &["o"],
        "port" => &["p"],
        "starboard" => &["s", "stbd"],
        "forward" => &["f", "fore"],
        "aft" => &["a"],
        "turbolift" => &["tl"],
        "clockwise" => &["cw", "clock"],
        "counterclockwise" => &[
            "ccw",
            "counter",
            "counter-clockwise",
            "anticlockwise",
            "anti-clockwise",
        ],
        "hubward" => &["h", "hw", "hub", "inward"],
        "rimward" => &["r", "rw", "rim", "outward"],
        _ => &[],
    }
}

/// Whether player input names the given exit direction, either in full or by
/// one of its abbreviations. Case-insensitive.
pub fn matches_direction(input: &str, direction: &str) -> bool {
    let input = input.to_lowercase();
    if input == direction.to_lowercase() {
        return true;
    }
    direction_abbreviations(direction)
        .iter()
        .any(|abbr| *abbr == input)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("n", "north", true)]
    #[test_case("NORTH", "north", true)]
    #[test_case("n", "south", false)]
    #[test_case("stbd", "starboard", true)]
    #[test_case("s", "starboard", true)]
    #[test_case("anti-clockwise", "counterclockwise", true)]
    #[test_case("hub", "hubward", true)]
    #[test_case("outward", "rimward", true)]
    #[test_case("tl", "turbolift", true)]
    #[test_case("widdershins", "counterclockwise", false)]
    fn test_matches_direction(input: &str, direction: &str, expected: bool) {
        assert_eq!(matches_direction(input, direction), expected);
    }

    #[test]
    fn test_unknown_direction_full_word_still_matches() {
        assert!(matches_direction("widdershins", "Widdershins"));
        assert!(direction_abbreviations("widdershins").is_empty());
    }
}
