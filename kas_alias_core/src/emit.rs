//! Ingest tokenizer and `nm -n` emitter
//!
//! Parsing and formatting are the two halves of the same textual contract
//! (`<hex-address> <type-char> <name>`), so they are kept together here the
//! way the teacher groups symmetric read/write format code in one module.

use std::io::{BufRead, Write};

use crate::store::SymbolStore;

/// The two markers that indicate a name has already been aliased by a prior
/// run of this tool. Their presence anywhere in the input short-circuits the
/// pass (see spec.md §4.2 step 1/2 and §6).
const IDEMPOTENCE_MARKERS: [&str; 2] = ["@_", "__alias__1"];

/// Parses one `nm -n` line: `<hex-address> <type-char> <name>`, exactly
/// three whitespace-separated fields. Returns `None` for anything malformed,
/// which the caller silently skips.
pub fn parse_nm_line(line: &str) -> Option<(u64, char, String)> {
    let mut fields = line.split_whitespace();
    let address_field = fields.next()?;
    let type_field = fields.next()?;
    let name_field = fields.next()?;
    if fields.next().is_some() {
        return None;
    }

    let address = u64::from_str_radix(address_field, 16).ok()?;
    let mut type_chars = type_field.chars();
    let sym_type = type_chars.next()?;
    if type_chars.next().is_some() {
        return None;
    }
    if name_field.is_empty() || name_field.len() > 255 {
        return None;
    }

    Some((address, sym_type, name_field.to_string()))
}

/// Reads `input` line by line, appending every well-formed record to
/// `store`. Returns `true` if any name carries an idempotence marker, in
/// which case the alias engine must short-circuit straight to emit.
pub fn ingest(input: &mut impl BufRead, store: &mut SymbolStore) -> std::io::Result<bool> {
    let mut already_processed = false;
    let mut line = String::new();
    loop {
        line.clear();
        let n = input.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let Some((address, sym_type, name)) = parse_nm_line(trimmed) else {
            continue;
        };
        if IDEMPOTENCE_MARKERS.iter().any(|m| name.contains(m)) {
            already_processed = true;
        }
        store.append(name, address, sym_type);
    }
    Ok(already_processed)
}

/// Writes every record in `store`'s current order as
/// `%08lx %c %s\n` — lowercase hex address, zero-padded to at least 8 digits
/// (wider addresses widen naturally), type character, name.
pub fn emit(store: &SymbolStore, writer: &mut impl Write) -> std::io::Result<()> {
    for record in store.iter() {
        writeln!(writer, "{:08x} {} {}", record.address, record.sym_type, record.name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortKey;
    use std::io::Cursor;

    #[test]
    fn parses_well_formed_line() {
        assert_eq!(
            parse_nm_line("ffffffff000001a0 t device_show"),
            Some((0xffffffff000001a0, 't', "device_show".to_string()))
        );
    }

    #[test]
    fn skips_malformed_lines() {
        assert_eq!(parse_nm_line(""), None);
        assert_eq!(parse_nm_line("ffffffff000001a0 t"), None);
        assert_eq!(parse_nm_line("ffffffff000001a0 t device_show extra"), None);
        assert_eq!(parse_nm_line("not-hex t device_show"), None);
        assert_eq!(parse_nm_line("ffffffff000001a0 tt device_show"), None);
    }

    #[test]
    fn ingest_detects_idempotence_markers() {
        let mut store = SymbolStore::new();
        let mut input = Cursor::new("ffffffff000001a0 t device_show@_drivers_foo_c\n");
        let already = ingest(&mut input, &mut store).unwrap();
        assert!(already);
    }

    #[test]
    fn ingest_then_emit_round_trips_width_and_order() {
        let mut store = SymbolStore::new();
        let mut input = Cursor::new(
            "ffffffff000002b0 t device_show\nffffffff000001a0 t other_func\n",
        );
        ingest(&mut input, &mut store).unwrap();
        store.sort(SortKey::ByAddress);

        let mut out = Vec::new();
        emit(&store, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "ffffffff000001a0 t other_func\nffffffff000002b0 t device_show\n"
        );
    }
}
