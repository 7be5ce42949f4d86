//! Measures a fresh store starts with.

use crate::mapper::{DIP_PDF_LABEL, DIP_PROVIDER};
use crate::schema::{ExternalRef, Measure, MeasureOrigin, MeasureStatus, SourceLink, Tally};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use time::{Duration, OffsetDateTime};

pub const SEED_QUORUM: u64 = 500;

struct SeedEntry {
    id: &'static str,
    title: &'static str,
    summary: &'static str,
    body: &'static str,
    category: &'static str,
    started_days_ago: i64,
    created_days_ago: i64,
    totals: Tally,
    document_id: &'static str,
    document_number: &'static str,
    pdf_url: &'static str,
}

const SEEDS: &[SeedEntry] = &[
    SeedEntry {
        id: "seed-1",
        title: "Entwurf eines Gesetzes zur Förderung erneuerbarer Energien",
        summary: "Drucksache 20/1234 (WP 20) - Vorschlag zur Erhöhung der Förderquoten für Windkraft und Solarenergie",
        body: "# Gesetzentwurf: Förderung erneuerbarer Energien\n\n\
## Zusammenfassung\n\n\
Dieser Gesetzentwurf sieht vor, die Förderquoten für erneuerbare Energien zu erhöhen und den Ausbau von Windkraft- und Solaranlagen zu beschleunigen.\n\n\
## Auswirkungen\n\n\
- Erhöhung der Fördersätze um 15%\n\
- Vereinfachte Genehmigungsverfahren\n\
- Ziel: 80% Erneuerbare bis 2030\n",
        category: "Klima & Energie",
        started_days_ago: 5,
        created_days_ago: 10,
        totals: Tally { for_votes: 342, against: 128, abstain: 45 },
        document_id: "dip-12345",
        document_number: "20/1234",
        pdf_url: "https://dserver.bundestag.de/btd/20/012/2001234.pdf",
    },
    SeedEntry {
        id: "seed-2",
        title: "Digitale Verwaltungsmodernisierung 2026",
        summary: "Drucksache 20/2345 (WP 20) - Beschleunigung der Digitalisierung öffentlicher Dienstleistungen",
        body: "# Gesetzentwurf: Digitale Verwaltungsmodernisierung\n\n\
## Zusammenfassung\n\n\
Alle Behördengänge sollen bis 2027 digital möglich sein. Bürger erhalten digitale Identitäten und können Verwaltungsleistungen online nutzen.\n\n\
## Auswirkungen\n\n\
- Einführung digitaler Identitäten\n\
- Online-Zugang zu allen Verwaltungsleistungen\n\
- Investition von 2 Mrd. € über 3 Jahre\n",
        category: "Digitales & Verwaltung",
        started_days_ago: 3,
        created_days_ago: 8,
        totals: Tally { for_votes: 428, against: 67, abstain: 31 },
        document_id: "dip-23456",
        document_number: "20/2345",
        pdf_url: "https://dserver.bundestag.de/btd/20/023/2002345.pdf",
    },
    SeedEntry {
        id: "seed-3",
        title: "Mobilitätswende: ÖPNV-Ausbau und Ticketreform",
        summary: "Drucksache 20/3456 (WP 20) - Bundesweites Nahverkehrsticket und Investitionen in Infrastruktur",
        body: "# Gesetzentwurf: ÖPNV-Ausbau und Ticketreform\n\n\
## Zusammenfassung\n\n\
Einführung eines bundesweiten 49-Euro-Tickets und massiver Ausbau des öffentlichen Nahverkehrs.\n\n\
## Auswirkungen\n\n\
- Bundesweites 49-Euro-Ticket\n\
- 10 Mrd. € Investitionen in Infrastruktur\n\
- Verdopplung der Taktung in Ballungsräumen\n",
        category: "Verkehr & Mobilität",
        started_days_ago: 1,
        created_days_ago: 6,
        totals: Tally { for_votes: 521, against: 98, abstain: 52 },
        document_id: "dip-34567",
        document_number: "20/3456",
        pdf_url: "https://dserver.bundestag.de/btd/20/034/2003456.pdf",
    },
];

/// The built-in seed set, dated relative to `now`.
///
/// Seed tallies stand for votes collected before this store existed; the
/// ledger only ever adjusts them by one per cast.
pub fn default_measures(now: OffsetDateTime) -> Vec<Measure> {
    SEEDS
        .iter()
        .map(|seed| {
            let start_at = now - Duration::days(seed.started_days_ago);
            Measure {
                id: seed.id.to_string(),
                title: seed.title.to_string(),
                summary: seed.summary.to_string(),
                body_markdown: seed.body.to_string(),
                category: seed.category.to_string(),
                start_at,
                end_at: start_at + Duration::days(30),
                status: MeasureStatus::Active,
                quorum: SEED_QUORUM,
                totals: seed.totals,
                created_at: now - Duration::days(seed.created_days_ago),
                updated_at: now,
                sources: vec![SourceLink {
                    label: DIP_PDF_LABEL.to_string(),
                    url: seed.pdf_url.to_string(),
                }],
                origin: MeasureOrigin::OfficialSource,
                submitted_by: None,
                external: Some(ExternalRef {
                    provider: DIP_PROVIDER.to_string(),
                    document_id: seed.document_id.to_string(),
                    document_number: Some(seed.document_number.to_string()),
                    legislative_period: Some(20),
                    document_url: Some(seed.pdf_url.to_string()),
                    updated_at: None,
                }),
            }
        })
        .collect()
}

/// Loads a replacement seed set from a YAML list of measures.
pub fn load_seed_file(path: &Path) -> Result<Vec<Measure>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let measures: Vec<Measure> = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing seed file {}", path.display()))?;
    if measures.is_empty() {
        bail!("seed file {} contains no measures", path.display());
    }
    Ok(measures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn defaults_are_active_with_thirty_day_windows() {
        let now = datetime!(2025-03-01 12:00 UTC);
        let measures = default_measures(now);
        assert_eq!(measures.len(), 3);
        for measure in &measures {
            assert_eq!(measure.status, MeasureStatus::Active);
            assert_eq!(measure.end_at - measure.start_at, Duration::days(30));
            assert!(measure.start_at <= now && measure.end_at > now);
        }
    }

    #[test]
    fn seed_file_round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.yaml");
        let measures = default_measures(datetime!(2025-03-01 12:00 UTC));
        fs::write(&path, serde_yaml::to_string(&measures[..1]).unwrap()).unwrap();

        let loaded = load_seed_file(&path).unwrap();
        assert_eq!(loaded, measures[..1].to_vec());
    }

    #[test]
    fn empty_seed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.yaml");
        fs::write(&path, "[]\n").unwrap();
        assert!(load_seed_file(&path).is_err());
    }

    #[test]
    fn seed_file_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        let err = load_seed_file(&missing).unwrap_err();
        assert!(
            format!("{err:#}").contains(&format!("reading seed file {}", missing.display())),
            "{err:#}"
        );

        let broken = dir.path().join("broken.yaml");
        fs::write(&broken, "- id: [unterminated\n").unwrap();
        let err = load_seed_file(&broken).unwrap_err();
        assert!(err.to_string().contains(&format!("parsing seed file {}", broken.display())));
    }
}
