//! Client import from CSV exports
//!
//! Column headers come from whatever spreadsheet the user exported, in French
//! or English. They are normalised (case, accents, punctuation) and mapped to
//! client fields. Rows lacking a required field are skipped.

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use super::entity::ClientFields;
use crate::shared::error::{PlatformError, Result};

/// Client field a column maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Name,
    FirstName,
    LastName,
    Email,
    Phone,
    Company,
    Address,
    PostalCode,
    City,
    Notes,
}

/// Parsed upload
#[derive(Debug, Default)]
pub struct ImportBatch {
    /// Usable rows, validated and trimmed
    pub rows: Vec<ClientFields>,
    /// Non-empty data rows in the file
    pub total: usize,
}

impl ImportBatch {
    pub fn skipped(&self) -> usize {
        self.total - self.rows.len()
    }
}

/// Lower-case, strip accents, fold punctuation to single spaces.
pub fn normalize_header(header: &str) -> String {
    let folded: String = header
        .trim_start_matches('\u{feff}')
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            'ÿ' => 'y',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map a raw header to a client field.
pub fn column_for(header: &str) -> Option<Column> {
    let column = match normalize_header(header).as_str() {
        "nom" | "name" | "nom complet" | "full name" | "client" | "contact" | "nom du client" => {
            Column::Name
        }
        "prenom" | "first name" | "firstname" | "given name" => Column::FirstName,
        "nom de famille" | "last name" | "lastname" | "surname" | "family name" => Column::LastName,
        "email" | "e mail" | "mail" | "courriel" | "adresse email" | "adresse e mail"
        | "email address" | "adresse mail" => Column::Email,
        "telephone" | "tel" | "phone" | "portable" | "mobile" | "numero de telephone"
        | "phone number" | "telephone portable" | "gsm" => Column::Phone,
        "entreprise" | "societe" | "company" | "raison sociale" | "organisation"
        | "organization" | "structure" => Column::Company,
        "adresse" | "address" | "rue" | "adresse postale" | "street" => Column::Address,
        "code postal" | "cp" | "postal code" | "zip" | "zip code" | "postcode" => Column::PostalCode,
        "ville" | "city" | "commune" | "localite" | "town" => Column::City,
        "notes" | "note" | "commentaire" | "commentaires" | "remarques" | "remarque"
        | "comments" => Column::Notes,
        _ => return None,
    };
    Some(column)
}

/// `;` when the header line has more semicolons than commas.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Spreadsheet uploads are refused; only delimited text is read.
pub fn ensure_csv(file_name: Option<&str>, content_type: Option<&str>, bytes: &[u8]) -> Result<()> {
    let name = file_name.unwrap_or_default().to_lowercase();
    let content_type = content_type.unwrap_or_default();
    let spreadsheet = name.ends_with(".xlsx")
        || name.ends_with(".xls")
        || name.ends_with(".ods")
        || content_type.contains("spreadsheetml")
        || content_type.contains("ms-excel")
        // zip container
        || bytes.starts_with(b"PK\x03\x04");

    if spreadsheet {
        return Err(PlatformError::validation(
            "Les fichiers Excel ne sont pas pris en charge. Exportez le fichier au format CSV.",
        ));
    }
    Ok(())
}

/// UTF-8, falling back to Latin-1 for legacy spreadsheet exports.
fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn optional(record: &StringRecord, index: Option<usize>) -> Option<String> {
    Some(cell(record, index)).filter(|v| !v.is_empty())
}

/// Parse an uploaded file into client rows.
pub fn parse_clients(bytes: &[u8]) -> Result<ImportBatch> {
    let text = decode(bytes);
    if text.trim().is_empty() {
        return Err(PlatformError::validation("Le fichier est vide"));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(&text))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PlatformError::validation(format!("Fichier CSV illisible : {}", e)))?
        .clone();

    let index_of = |wanted: Column| headers.iter().position(|h| column_for(h) == Some(wanted));
    let name = index_of(Column::Name);
    let first_name = index_of(Column::FirstName);
    let last_name = index_of(Column::LastName);
    let email = index_of(Column::Email);
    let phone = index_of(Column::Phone);
    let company = index_of(Column::Company);
    let address = index_of(Column::Address);
    let postal_code = index_of(Column::PostalCode);
    let city = index_of(Column::City);
    let notes = index_of(Column::Notes);

    if name.is_none() && first_name.is_none() && last_name.is_none() {
        return Err(PlatformError::validation("Colonne « nom » introuvable dans le fichier"));
    }

    let mut batch = ImportBatch::default();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!(line = line + 2, error = %e, "Unreadable CSV row skipped");
                batch.total += 1;
                continue;
            }
        };
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        batch.total += 1;

        let mut full_name = cell(&record, name);
        if full_name.is_empty() {
            full_name = [cell(&record, first_name), cell(&record, last_name)]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
        }

        let fields = ClientFields {
            name: full_name,
            email: cell(&record, email),
            phone: cell(&record, phone),
            company: optional(&record, company),
            notes: optional(&record, notes),
            address: optional(&record, address),
            postal_code: optional(&record, postal_code),
            city: optional(&record, city),
        };

        match fields.validated() {
            Ok(fields) => batch.rows.push(fields),
            Err(_) => debug!(line = line + 2, "CSV row missing a required field, skipped"),
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Téléphone"), "telephone");
        assert_eq!(normalize_header("  E-Mail "), "e mail");
        assert_eq!(normalize_header("Code_Postal"), "code postal");
        assert_eq!(normalize_header("\u{feff}Nom"), "nom");
        assert_eq!(normalize_header("SOCIÉTÉ"), "societe");
    }

    #[test]
    fn test_column_mapping() {
        assert_eq!(column_for("Courriel"), Some(Column::Email));
        assert_eq!(column_for("Tél."), Some(Column::Phone));
        assert_eq!(column_for("Raison sociale"), Some(Column::Company));
        assert_eq!(column_for("CP"), Some(Column::PostalCode));
        assert_eq!(column_for("Prénom"), Some(Column::FirstName));
        assert_eq!(column_for("Chiffre d'affaires"), None);
    }

    #[test]
    fn test_semicolon_export_with_french_headers() {
        let csv = "Nom;E-mail;Téléphone;Société;Ville\n\
                   Jean Dupont;jean@dupont.fr;0612345678;Dupont SARL;Lyon\n\
                   Sans Mail;;0600000000;;\n\
                   ;;;;\n\
                   Claire Martin;claire@martin.fr;0700000000;;Paris\n";

        let batch = parse_clients(csv.as_bytes()).unwrap();
        assert_eq!(batch.total, 3);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.skipped(), 1);

        let jean = &batch.rows[0];
        assert_eq!(jean.name, "Jean Dupont");
        assert_eq!(jean.company.as_deref(), Some("Dupont SARL"));
        assert_eq!(batch.rows[1].city.as_deref(), Some("Paris"));
        assert_eq!(batch.rows[1].company, None);
    }

    #[test]
    fn test_comma_export_with_split_names() {
        let csv = "First Name,Last Name,Email,Phone\nAda,Lovelace,ADA@example.com,+44 20 0000\n";
        let batch = parse_clients(csv.as_bytes()).unwrap();
        assert_eq!(batch.rows[0].name, "Ada Lovelace");
        assert_eq!(batch.rows[0].email, "ada@example.com");
    }

    #[test]
    fn test_latin1_file_is_decoded() {
        let mut bytes = b"Nom;Email;T".to_vec();
        bytes.push(0xE9); // é in Latin-1
        bytes.extend_from_slice(b"l\xE9phone\nRen\xE9e;renee@ex.fr;0102030405\n");
        let batch = parse_clients(&bytes).unwrap();
        assert_eq!(batch.rows[0].name, "Renée");
        assert_eq!(batch.rows[0].phone, "0102030405");
    }

    #[test]
    fn test_missing_name_column_rejected() {
        assert!(parse_clients(b"Email,Phone\na@b.fr,1\n").is_err());
        assert!(parse_clients(b"   ").is_err());
    }

    #[test]
    fn test_spreadsheets_refused() {
        assert!(ensure_csv(Some("clients.XLSX"), None, b"").is_err());
        assert!(ensure_csv(Some("upload"), None, b"PK\x03\x04rest").is_err());
        assert!(ensure_csv(Some("clients.csv"), Some("text/csv"), b"Nom").is_ok());
    }
}
