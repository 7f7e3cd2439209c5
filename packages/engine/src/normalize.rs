use cu::pre::*;
use regex::Regex;

/// Collapses standard-library verbosity in rendered type names into the
/// short forms a human would write.
///
/// Two classes of rewrites: unconditional substitutions (inline namespace
/// spellings, `basic_string` long forms) and default-argument collapses
/// (allocators, comparators, hashers). The collapses are applied in a
/// fixed-point loop so nested containers reduce from the inside out; every
/// rewrite strictly shortens the string, so the loop terminates and the
/// whole pass is idempotent.
pub struct Normalizer {
    /// Finds candidate container instantiations for the collapse pass
    finder: Regex,
}

/// Fixed substitutions, applied once before the collapse loop. Both the
/// pre-C++11 `> >` spelling (as recorded by compilers) and the tight `>>`
/// spelling are covered.
#[rustfmt::skip]
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("std::__1::", "std::"),
    ("std::__ndk1::", "std::"),
    (
        "std::basic_string<char, std::char_traits<char>, std::allocator<char> >",
        "std::string",
    ),
    (
        "std::basic_string<char, std::char_traits<char>, std::allocator<char>>",
        "std::string",
    ),
    ("std::basic_string_view<char, std::char_traits<char> >", "std::string_view"),
    ("std::basic_string_view<char, std::char_traits<char>>", "std::string_view"),
    (
        "std::chrono::time_point<std::chrono::steady_clock, std::chrono::duration<long long, std::ratio<1L, 1000000000L> > >",
        "std::chrono::steady_clock::time_point",
    ),
    (
        "std::chrono::time_point<std::chrono::steady_clock, std::chrono::duration<long long, std::ratio<1L, 1000000000L>>>",
        "std::chrono::steady_clock::time_point",
    ),
];

impl Normalizer {
    pub fn new() -> cu::Result<Self> {
        let finder = cu::check!(
            Regex::new(
                r"(?:std::(?:unique_ptr|vector|list|deque|queue|unordered_map|unordered_set|map|set)|gsl::span|glm::vec|glm::mat|Bedrock::Result)<"
            ),
            "failed to compile the container collapse pattern"
        )?;
        Ok(Self { finder })
    }

    /// Rewrite one type string (or a whole rendered file) to canonical
    /// short forms
    pub fn apply(&self, input: &str) -> String {
        let mut text = input.to_string();
        for (from, to) in SUBSTITUTIONS {
            text = text.replace(from, to);
        }
        loop {
            let output = self.collapse_pass(&text);
            if output == text {
                return output;
            }
            text = output;
        }
    }

    /// One left-to-right pass collapsing every instantiation whose
    /// trailing arguments are the defaults of the leading ones
    fn collapse_pass(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;
        while let Some(found) = self.finder.find_at(text, pos) {
            let open = found.end() - 1;
            let name = &text[found.start()..open];
            let collapsed = split_template_args(text, open)
                .and_then(|(args, close)| collapse(name, &args).map(|c| (c, close)));
            match collapsed {
                Some((replacement, close)) => {
                    out.push_str(&text[pos..found.start()]);
                    out.push_str(&replacement);
                    pos = close + 1;
                }
                None => {
                    // not a collapsible instantiation; step past the name
                    // so nested occurrences are still found
                    out.push_str(&text[pos..found.start() + 1]);
                    pos = found.start() + 1;
                }
            }
        }
        out.push_str(&text[pos..]);
        out
    }
}

/// Split the template arguments starting at the `<` at `open` into
/// top-level pieces, returning the trimmed arguments and the index of the
/// closing `>`
fn split_template_args(text: &str, open: usize) -> Option<(Vec<String>, usize)> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut parens = 0usize;
    let mut args = Vec::new();
    let mut start = open + 1;
    for i in open..bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    args.push(text[start..i].trim().to_string());
                    return Some((args, i));
                }
            }
            b'(' => parens += 1,
            b')' => parens = parens.checked_sub(1)?,
            b',' if depth == 1 && parens == 0 => {
                args.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    None
}

/// Whitespace-insensitive type spelling equality
fn same_type(a: &str, b: &str) -> bool {
    let mut a = a.chars().filter(|c| !c.is_whitespace());
    let mut b = b.chars().filter(|c| !c.is_whitespace());
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (x, y) if x == y => {}
            _ => return false,
        }
    }
}

/// The default allocator/comparator/hasher spellings collapsed away,
/// parameterised by the leading arguments
fn collapse(name: &str, args: &[String]) -> Option<String> {
    match (name, args) {
        ("std::unique_ptr", [t, d]) if same_type(d, &format!("std::default_delete<{t}>")) => {
            Some(format!("std::unique_ptr<{t}>"))
        }
        ("std::vector" | "std::list" | "std::deque", [t, a])
            if same_type(a, &format!("std::allocator<{t}>")) =>
        {
            Some(format!("{name}<{t}>"))
        }
        ("std::queue", [t, c]) if same_type(c, &format!("std::deque<{t}>")) => {
            Some(format!("std::queue<{t}>"))
        }
        ("std::map", [k, v, c, a])
            if same_type(c, &format!("std::less<{k}>")) && is_pair_allocator(a, k, v) =>
        {
            Some(format!("std::map<{k}, {v}>"))
        }
        ("std::set", [t, c, a])
            if same_type(c, &format!("std::less<{t}>"))
                && same_type(a, &format!("std::allocator<{t}>")) =>
        {
            Some(format!("std::set<{t}>"))
        }
        ("std::unordered_map", [k, v, h, e, a])
            if same_type(h, &format!("std::hash<{k}>"))
                && same_type(e, &format!("std::equal_to<{k}>"))
                && is_pair_allocator(a, k, v) =>
        {
            Some(format!("std::unordered_map<{k}, {v}>"))
        }
        ("std::unordered_set", [t, h, e, a])
            if same_type(h, &format!("std::hash<{t}>"))
                && same_type(e, &format!("std::equal_to<{t}>"))
                && same_type(a, &format!("std::allocator<{t}>")) =>
        {
            Some(format!("std::unordered_set<{t}>"))
        }
        ("gsl::span", [t, n])
            if n.ends_with("UL") && n[..n.len() - 2].bytes().all(|b| b.is_ascii_digit()) =>
        {
            Some(format!("gsl::span<{t}>"))
        }
        ("glm::vec", [n, elem, q])
            if n.len() == 1
                && n.bytes().all(|b| b.is_ascii_digit())
                && same_type(q, "(glm::qualifier)0") =>
        {
            match elem.as_str() {
                "float" => Some(format!("glm::vec{n}")),
                "int" => Some(format!("glm::ivec{n}")),
                _ => None,
            }
        }
        ("glm::mat", [n, m, elem, q])
            if n.len() == 1
                && m.len() == 1
                && n.bytes().all(|b| b.is_ascii_digit())
                && m.bytes().all(|b| b.is_ascii_digit())
                && elem == "float"
                && same_type(q, "(glm::qualifier)0") =>
        {
            Some(format!("glm::mat{n}x{m}"))
        }
        ("Bedrock::Result", [t, e]) if same_type(e, "std::error_code") => {
            Some(format!("Bedrock::Result<{t}>"))
        }
        _ => None,
    }
}

/// `std::allocator<std::pair<const K, V>>`, accepting east or west const
fn is_pair_allocator(a: &str, k: &str, v: &str) -> bool {
    same_type(a, &format!("std::allocator<std::pair<const {k}, {v}>>"))
        || same_type(a, &format!("std::allocator<std::pair<{k} const, {v}>>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new().expect("rules must compile")
    }

    #[test]
    fn test_container_collapse() {
        let n = normalizer();
        assert_eq!(
            n.apply("std::vector<int, std::allocator<int> >"),
            "std::vector<int>"
        );
    }

    #[test]
    fn test_nested_container_collapse() {
        let n = normalizer();
        let input = "std::vector<std::vector<int, std::allocator<int> >, \
                     std::allocator<std::vector<int, std::allocator<int> > > >";
        assert_eq!(n.apply(input), "std::vector<std::vector<int>>");
    }

    #[test]
    fn test_inline_namespace_strip() {
        let n = normalizer();
        assert_eq!(n.apply("std::__1::string"), "std::string");
        assert_eq!(n.apply("std::__ndk1::size_t"), "std::size_t");
    }

    #[test]
    fn test_string_long_form() {
        let n = normalizer();
        assert_eq!(
            n.apply("std::__1::basic_string<char, std::char_traits<char>, std::allocator<char> >"),
            "std::string"
        );
        assert_eq!(
            n.apply("std::basic_string_view<char, std::char_traits<char> >"),
            "std::string_view"
        );
    }

    #[test]
    fn test_unique_ptr_and_maps() {
        let n = normalizer();
        assert_eq!(
            n.apply("std::unique_ptr<Foo, std::default_delete<Foo> >"),
            "std::unique_ptr<Foo>"
        );
        assert_eq!(
            n.apply(
                "std::map<int, Foo, std::less<int>, \
                 std::allocator<std::pair<const int, Foo> > >"
            ),
            "std::map<int, Foo>"
        );
        assert_eq!(
            n.apply(
                "std::unordered_map<int, Foo, std::hash<int>, std::equal_to<int>, \
                 std::allocator<std::pair<const int, Foo> > >"
            ),
            "std::unordered_map<int, Foo>"
        );
        assert_eq!(
            n.apply(
                "std::unordered_set<Key, std::hash<Key>, std::equal_to<Key>, \
                 std::allocator<Key> >"
            ),
            "std::unordered_set<Key>"
        );
        assert_eq!(
            n.apply("std::set<Key, std::less<Key>, std::allocator<Key> >"),
            "std::set<Key>"
        );
        assert_eq!(
            n.apply("std::queue<Job, std::deque<Job, std::allocator<Job> > >"),
            "std::queue<Job>"
        );
    }

    #[test]
    fn test_span_glm_and_result() {
        let n = normalizer();
        assert_eq!(n.apply("gsl::span<const Actor *, 18446744073709551615UL>"), "gsl::span<const Actor *>");
        assert_eq!(n.apply("glm::vec<3, float, (glm::qualifier)0>"), "glm::vec3");
        assert_eq!(n.apply("glm::vec<2, int, (glm::qualifier)0>"), "glm::ivec2");
        assert_eq!(n.apply("glm::mat<4, 4, float, (glm::qualifier)0>"), "glm::mat4x4");
        assert_eq!(
            n.apply("Bedrock::Result<int, std::error_code>"),
            "Bedrock::Result<int>"
        );
    }

    #[test]
    fn test_steady_clock_spelling() {
        let n = normalizer();
        let input = "std::chrono::time_point<std::chrono::steady_clock, \
                     std::chrono::duration<long long, std::ratio<1L, 1000000000L> > >";
        assert_eq!(n.apply(input), "std::chrono::steady_clock::time_point");
    }

    #[test]
    fn test_mismatched_defaults_are_untouched() {
        let n = normalizer();
        let custom = "std::vector<int, MyAllocator<int> >";
        assert_eq!(n.apply(custom), custom);
        let different = "std::vector<int, std::allocator<long> >";
        assert_eq!(n.apply(different), different);
    }

    #[test]
    fn test_idempotent() {
        let n = normalizer();
        let inputs = [
            "std::vector<std::vector<int, std::allocator<int> >, \
             std::allocator<std::vector<int, std::allocator<int> > > >",
            "std::__1::basic_string<char, std::char_traits<char>, std::allocator<char> >",
            "std::vector<int>",
            "void (*)(std::vector<int, std::allocator<int> >)",
        ];
        for input in inputs {
            let once = n.apply(input);
            let twice = n.apply(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_canonical_spellings_are_no_ops() {
        let n = normalizer();
        for canonical in ["std::vector<int>", "std::string", "std::map<int, Foo>"] {
            assert_eq!(n.apply(canonical), canonical);
        }
    }
}
