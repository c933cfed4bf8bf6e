// src/extractors/html.rs

// --- Imports ---
use crate::spensiones::models::LinkRule;
use crate::utils::error::ExtractError;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

// --- Constants ---
/// A table needs a header row plus at least one more row to qualify.
pub const MIN_TABLE_ROWS: usize = 2;
/// Longest file stem derived from a cuadro title.
pub const MAX_STEM_LEN: usize = 180;
// Span limits browsers apply to colspan and rowspan.
pub const MAX_COLSPAN: usize = 1000;
pub const MAX_ROWSPAN: usize = 65534;

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table").expect("Failed to compile TABLE_SELECTOR")
});

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("tr").expect("Failed to compile ROW_SELECTOR")
});

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h3").expect("Failed to compile TITLE_SELECTOR")
});

// --- Regex Patterns (Lazy Static) ---
static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\w\s-]").expect("Failed to compile NON_WORD_RE")
});

static WHITESPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RUN_RE")
});

static UNDERSCORE_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"_+").expect("Failed to compile UNDERSCORE_RUN_RE")
});

// --- Data Structures ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub text: String,  // Cleaned text content
    pub header: bool,  // Came from a <th>
    pub colspan: usize,
    pub rowspan: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    pub cells: Vec<RawCell>,
}

impl RawRow {
    pub fn is_header_only(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|c| c.header)
    }
}

/// Text grid of one HTML table, rows in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

// --- Decoding ---

/// Decodes a document trying UTF-8 first and windows-1252 second.
pub fn decode(bytes: &[u8]) -> Result<String, ExtractError> {
    decode_with(bytes, &[UTF_8, WINDOWS_1252])
}

/// Decodes with the first encoding in `chain` that accepts every byte.
/// Never substitutes replacement characters.
pub fn decode_with(bytes: &[u8], chain: &[&'static Encoding]) -> Result<String, ExtractError> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    for encoding in chain {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) {
            tracing::debug!("Decoded {} bytes as {}", bytes.len(), encoding.name());
            // UTF-8 no-break spaces read through a legacy code page leave a stray 'Â'.
            return Ok(text.replace("\u{C2}\u{A0}", "\u{A0}"));
        }
        tracing::debug!("{} rejected {} bytes", encoding.name(), bytes.len());
    }

    Err(ExtractError::Decode {
        len: bytes.len(),
        attempted: chain.iter().map(|e| e.name()).collect(),
    })
}

// --- Text cleanup ---

/// Collapses whitespace runs (including no-break spaces) and trims.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Title of a cuadro page: its first `<h3>`.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn fold_ascii(c: char) -> Option<char> {
    if c.is_ascii() {
        return Some(c);
    }
    let folded = match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        c if c.is_whitespace() => ' ',
        _ => return None,
    };
    Some(folded)
}

/// Turns a cuadro title into a filesystem-safe lowercase stem.
pub fn file_stem(title: &str, max_len: usize) -> String {
    let ascii: String = title.trim().chars().filter_map(fold_ascii).collect();
    let stem = NON_WORD_RE.replace_all(&ascii, "");
    let stem = WHITESPACE_RUN_RE.replace_all(&stem, "_");
    let stem = UNDERSCORE_RUN_RE.replace_all(&stem, "_");
    let stem: String = stem.to_lowercase().chars().take(max_len).collect();
    stem.trim_matches('_').to_string()
}

// --- Table extraction ---

/// True when the nearest enclosing `<table>` of `row` is `table`.
fn belongs_to(row: ElementRef, table: ElementRef) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
        .map(|a| a.id() == table.id())
        .unwrap_or(false)
}

fn span_attr(cell: ElementRef, name: &str, max: usize) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .map_or(1, |n| n.min(max))
}

fn read_row(row: ElementRef) -> RawRow {
    let cells = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .map(|c| RawCell {
            text: element_text(c),
            header: c.value().name() == "th",
            colspan: span_attr(c, "colspan", MAX_COLSPAN),
            rowspan: span_attr(c, "rowspan", MAX_ROWSPAN),
        })
        .collect();
    RawRow { cells }
}

fn read_table(table: ElementRef) -> RawTable {
    let rows = table
        .select(&ROW_SELECTOR)
        .filter(|row| belongs_to(*row, table))
        .map(read_row)
        .filter(|row| !row.cells.is_empty())
        .collect();
    RawTable { rows }
}

/// Returns the first table, in document order, with at least [`MIN_TABLE_ROWS`] rows.
///
/// When no table qualifies, the first table made only of `<th>` rows is
/// returned so the converter can report it as empty. Anything else, such
/// as a one-row `<td>` placeholder, is [`ExtractError::TableNotFound`].
pub fn extract_first_table(html: &str) -> Result<RawTable, ExtractError> {
    let document = Html::parse_document(html);
    let mut header_only: Option<RawTable> = None;

    for (index, element) in document.select(&TABLE_SELECTOR).enumerate() {
        let table = read_table(element);
        if table.rows.len() >= MIN_TABLE_ROWS {
            tracing::debug!("Selected table #{} with {} rows", index, table.rows.len());
            return Ok(table);
        }
        tracing::trace!("Skipping table #{} with {} rows", index, table.rows.len());
        if header_only.is_none()
            && !table.rows.is_empty()
            && table.rows.iter().all(RawRow::is_header_only)
        {
            header_only = Some(table);
        }
    }

    header_only.ok_or(ExtractError::TableNotFound)
}

// --- Index pages ---

/// Collects cuadro links from an index page, resolved against `base`.
/// Order is preserved and repeated links are dropped.
pub fn extract_links(html: &str, rule: &LinkRule, base: &Url) -> Result<Vec<Url>, ExtractError> {
    let selector = Selector::parse(rule.selector)
        .map_err(|e| ExtractError::Selector(format!("{}: {:?}", rule.selector, e)))?;
    let document = Html::parse_document(html);

    let mut links: Vec<Url> = Vec::new();
    for href in document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains(rule.href_marker))
    {
        match base.join(href.trim()) {
            Ok(url) if !links.contains(&url) => links.push(url),
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring unresolvable link '{}': {}", href, e),
        }
    }
    Ok(links)
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::spensiones::models::{CARTERAS_AGREGADAS, ESTADOS_FINANCIEROS, SourceShape};

    #[test]
    fn decodes_utf8_and_falls_back_to_windows_1252() {
        assert_eq!(decode("Año ñandú".as_bytes()).unwrap(), "Año ñandú");

        // "Año" in windows-1252: 'ñ' is the single byte 0xF1, invalid as UTF-8.
        let legacy = b"A\xF1o 1.234,56";
        assert_eq!(decode(legacy).unwrap(), "Año 1.234,56");
    }

    #[test]
    fn decode_failure_reports_length_and_encodings() {
        let err = decode_with(b"\xFF\xFEabc", &[UTF_8]).unwrap_err();
        assert_eq!(
            err,
            ExtractError::Decode { len: 5, attempted: vec!["UTF-8"] }
        );
    }

    #[test]
    fn strips_bom_and_mojibake_nbsp() {
        let text = decode(b"\xEF\xBB\xBF<p>x</p>").unwrap();
        assert_eq!(text, "<p>x</p>");

        // UTF-8 nbsp (C2 A0) next to an invalid byte forces the legacy path.
        let text = decode(b"1\xC2\xA0234 \xF1").unwrap();
        assert_eq!(text, "1\u{A0}234 ñ");
    }

    #[test]
    fn cleans_whitespace_uniformly() {
        assert_eq!(clean_text("  Fondo\u{A0}\u{A0}A \n\t MMUS$ "), "Fondo A MMUS$");
        assert_eq!(clean_text(" \n "), "");
    }

    #[test]
    fn first_qualifying_table_skips_layout_tables() {
        let html = r#"
            <html><body>
            <table><tr><td>Menu</td></tr></table>
            <table>
              <tr><th>Tipo   de
                  Instrumento</th><th colspan="2">Fondo A</th></tr>
              <tr><td> Bonos </td><td>1.234,56</td><td>12,5</td></tr>
            </table>
            <table><tr><th>Other</th></tr><tr><td>ignored</td></tr></table>
            </body></html>
        "#;
        let table = extract_first_table(html).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells[0].text, "Tipo de Instrumento");
        assert!(table.rows[0].is_header_only());
        assert_eq!(table.rows[0].cells[1].colspan, 2);
        assert_eq!(table.rows[1].cells[0].text, "Bonos");
        assert!(!table.rows[1].cells[0].header);
    }

    #[test]
    fn nested_table_rows_are_not_counted_twice() {
        let html = r#"
            <table>
              <tr><td><table><tr><td>a</td></tr><tr><td>b</td></tr></table></td></tr>
            </table>
        "#;
        let table = extract_first_table(html).unwrap();
        // The outer table has one row; the nested one qualifies with two.
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells[0].text, "a");
    }

    #[test]
    fn document_without_tables_is_not_found() {
        let html = "<html><body><p>Sin información para el período</p></body></html>";
        assert_eq!(extract_first_table(html), Err(ExtractError::TableNotFound));
        assert_eq!(extract_first_table("<table></table>"), Err(ExtractError::TableNotFound));
    }

    #[test]
    fn single_data_row_placeholder_is_not_found() {
        let html = "<html><body><table><tr><td>Sin información para el período</td></tr></table></body></html>";
        assert_eq!(extract_first_table(html), Err(ExtractError::TableNotFound));

        let html = "<table><tr><td>Menu</td></tr></table><table><tr><th>Fecha</th></tr></table>";
        let table = extract_first_table(html).unwrap();
        assert_eq!(table.rows[0].cells[0].text, "Fecha");
    }

    #[test]
    fn oversized_spans_are_clamped() {
        let html = r#"<table>
            <tr><th colspan="4294967295">Fondo</th><th rowspan="70000">Total</th></tr>
            <tr><td>1</td><td>2</td></tr>
        </table>"#;
        let table = extract_first_table(html).unwrap();
        assert_eq!(table.rows[0].cells[0].colspan, MAX_COLSPAN);
        assert_eq!(table.rows[0].cells[1].rowspan, MAX_ROWSPAN);
        assert_eq!(table.rows[1].cells[0].colspan, 1);
    }

    #[test]
    fn header_only_table_is_returned_for_conversion() {
        let html = "<table><tr><th>Fecha</th><th>Valor Cuota</th></tr></table>";
        let table = extract_first_table(html).unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn title_and_file_stem() {
        let html = "<body><h3>  Cartera   Agregada de los Fondos de Pensiones: Inversión (MMUS$) </h3></body>";
        let title = extract_title(html).unwrap();
        assert_eq!(title, "Cartera Agregada de los Fondos de Pensiones: Inversión (MMUS$)");
        assert_eq!(
            file_stem(&title, MAX_STEM_LEN),
            "cartera_agregada_de_los_fondos_de_pensiones_inversion_mmus"
        );
        assert_eq!(file_stem("Año   --  Ñuble", 5), "ano_-");
        assert!(extract_title("<h3>   </h3>").is_none());
    }

    #[test]
    fn extracts_portfolio_links() {
        let SourceShape::Index(rule) = CARTERAS_AGREGADAS.source else {
            panic!("aggregated portfolios are an index dataset");
        };
        let base = Url::parse("https://www.spensiones.cl/apps/loadCarteras/loadCarAgr.php?periodo=202401").unwrap();
        let html = r#"
            <a title="Html" href="genera_xsl_v2.0.php?cuadro=1">Html</a>
            <a title="Xls" href="genera_xsl_v2.0.php?cuadro=1&xls=1">Xls</a>
            <a title="Html" href="/apps/loadCarteras/genera_xsl_v2.0.php?cuadro=2">Html</a>
            <a title="Html" href="genera_xsl_v2.0.php?cuadro=1">dup</a>
            <a title="Html" href="otra.php">other</a>
        "#;
        let links = extract_links(html, &rule, &base).unwrap();
        let links: Vec<&str> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec![
                "https://www.spensiones.cl/apps/loadCarteras/genera_xsl_v2.0.php?cuadro=1",
                "https://www.spensiones.cl/apps/loadCarteras/genera_xsl_v2.0.php?cuadro=2",
            ]
        );
    }

    #[test]
    fn extracts_financial_statement_links_from_tabs() {
        let SourceShape::Index(rule) = ESTADOS_FINANCIEROS.source else {
            panic!("financial statements are an index dataset");
        };
        let base = Url::parse("https://www.spensiones.cl/apps/loadEstadisticas/loadFecuFondo.php").unwrap();
        let html = r#"
            <div class="tab-pane" id="idu_1">
              <a href="loadCuadroFecuFondo.php?c=1&tipo=html">1</a>
              <a href="loadCuadroFecuFondo.php?c=1&tipo=xls">1x</a>
            </div>
            <div class="tab-pane" id="other"><a href="loadCuadroFecuFondo.php?c=9&tipo=html">9</a></div>
        "#;
        let links = extract_links(html, &rule, &base).unwrap();
        assert_eq!(links.len(), 1);
        assert!(links[0].as_str().ends_with("loadCuadroFecuFondo.php?c=1&tipo=html"));
    }
}
