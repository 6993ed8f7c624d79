//! Cyrillic to Latin transliteration for generated file names.

/// Substitutions, applied one after another over the whole string. Order
/// matters: the multi-letter outputs for `Щ`, `Ё`, `Ж` and friends come
/// before the single letters. `я` is listed twice; the second entry never
/// matches anything.
const TABLE: [(&str, &str); 66] = [
    ("Щ", "Sch"),
    ("щ", "sch"),
    ("Ё", "Yo"),
    ("Ж", "Zh"),
    ("Х", "Kh"),
    ("Ц", "Ts"),
    ("Ч", "Ch"),
    ("Ш", "Sh"),
    ("Ю", "Yu"),
    ("я", "ya"),
    ("ё", "yo"),
    ("ж", "zh"),
    ("х", "kh"),
    ("ц", "ts"),
    ("ч", "ch"),
    ("ш", "sh"),
    ("ю", "yu"),
    ("я", "ya"),
    ("А", "A"),
    ("Б", "B"),
    ("В", "V"),
    ("Г", "G"),
    ("Д", "D"),
    ("Е", "E"),
    ("З", "Z"),
    ("И", "I"),
    ("Й", "Y"),
    ("К", "K"),
    ("Л", "L"),
    ("М", "M"),
    ("Н", "N"),
    ("О", "O"),
    ("П", "P"),
    ("Р", "R"),
    ("С", "S"),
    ("Т", "T"),
    ("У", "U"),
    ("Ф", "F"),
    ("Ь", ""),
    ("Ы", "Y"),
    ("Ъ", ""),
    ("Э", "E"),
    ("а", "a"),
    ("б", "b"),
    ("в", "v"),
    ("г", "g"),
    ("д", "d"),
    ("е", "e"),
    ("з", "z"),
    ("и", "i"),
    ("й", "y"),
    ("к", "k"),
    ("л", "l"),
    ("м", "m"),
    ("н", "n"),
    ("о", "o"),
    ("п", "p"),
    ("р", "r"),
    ("с", "s"),
    ("т", "t"),
    ("у", "u"),
    ("ф", "f"),
    ("ь", ""),
    ("ы", "y"),
    ("ъ", ""),
    ("э", "e"),
];

/// Replace Cyrillic letters with Latin ones. Everything else is kept.
///
/// ```
/// use stow_upload::transliterate;
/// assert_eq!(transliterate("Щука"), "Schuka");
/// assert_eq!(transliterate("photo-2024"), "photo-2024");
/// ```
pub fn transliterate(input: &str) -> String {
    TABLE.iter().fold(input.to_string(), |acc, (from, to)| {
        if acc.contains(from) { acc.replace(from, to) } else { acc }
    })
}
