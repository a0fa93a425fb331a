// Populate a HashSet.
#[cfg(test)]
macro_rules! set(
    { $($key:expr),+ } => {
        {
            let mut m = ::std::collections::HashSet::new();
            $(
                m.insert($key);
            )+
            m
        }
     };
);

#[cfg(test)]
pub(crate) use set;

// If the value contains a , or " then quote the string, and double every "
pub fn csv_quote(s: &str) -> String {
    let mut t = "".to_string();
    let mut must_quote = false;
    for c in s.chars() {
        match c {
            '"' => {
                t.push(c);
                t.push(c);
                must_quote = true;
            }
            ',' => {
                t.push(c);
                must_quote = true;
            }
            _ => {
                t.push(c);
            }
        }
    }
    if must_quote {
        t = "\"".to_string() + &t + "\""
    }
    t
}

#[test]
pub fn csv_quote_test() {
    assert!(&csv_quote("abcde") == "abcde");
    assert!(&csv_quote("%usr") == "%usr");
    assert!(&csv_quote(r#"abc,de"#) == r#""abc,de""#);
    assert!(&csv_quote(r#"abc"de"#) == r#""abc""de""#);
    assert!(&csv_quote(r#"abc""de"#) == r#""abc""""de""#);
}
