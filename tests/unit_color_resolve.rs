use stderr_color::{Color, ColorCode, RESET};

const EXPECTED: &[(&str, &[u8])] = &[
    ("black", b"\x1b[30m"),
    ("red", b"\x1b[31m"),
    ("green", b"\x1b[32m"),
    ("yellow", b"\x1b[33m"),
    ("blue", b"\x1b[34m"),
    ("magenta", b"\x1b[35m"),
    ("cyan", b"\x1b[36m"),
    ("white", b"\x1b[37m"),
];

fn case_variants(name: &str) -> Vec<String> {
    let upper = name.to_ascii_uppercase();
    let alternating: String = name
        .chars()
        .enumerate()
        .map(|(i, c)| if i % 2 == 0 { c.to_ascii_uppercase() } else { c })
        .collect();
    let mut title = upper[..1].to_string();
    title.push_str(&name[1..]);
    vec![name.to_string(), upper, alternating, title]
}

#[test]
fn unit_every_supported_name_in_any_case() {
    for (name, start) in EXPECTED {
        for variant in case_variants(name) {
            let code = ColorCode::resolve(Some(&variant));
            assert_eq!(code.start, *start, "start for {variant}");
            assert_eq!(code.end, RESET, "end for {variant}");
            assert_eq!(code.color.as_str(), *name);
        }
    }
}

#[test]
fn unit_unset_empty_and_unknown_fall_back_to_red() {
    let red = ColorCode::new(Color::Red);
    assert_eq!(ColorCode::resolve(None), red);
    assert_eq!(ColorCode::resolve(Some("")), red);
    assert_eq!(ColorCode::resolve(Some("   ")), red);
    assert_eq!(ColorCode::resolve(Some("purple")), red);
    assert_eq!(ColorCode::resolve(Some("gren")), red);
    assert_eq!(ColorCode::resolve(Some("green blue")), red);
}

#[test]
fn unit_djb2_colliding_names_fall_back_to_red() {
    // Each of these hashes to the same djb2 value as a real color name.
    for s in ["greg,", "grg#n", "blw#", "bn3e", "cyc,", "cz@n"] {
        assert_eq!(ColorCode::resolve(Some(s)).color, Color::Red, "{s}");
    }
}

#[test]
fn unit_end_sequence_shared_by_all_colors() {
    for c in Color::ALL {
        assert_eq!(ColorCode::new(c).end, b"\x1b[0m");
    }
}
