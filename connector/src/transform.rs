use crate::types::{IndicatorType, RawIndicator};
use cbfeed::{IocKind, Iocs, Report};
use std::collections::BTreeSet;
use std::net::Ipv6Addr;

/// Title used when an indicator carries no description.
pub const FALLBACK_TITLE: &str = "";

/// Multiplier mapping the 0..=5 rating scale onto 0..=100.
const SCORE_PER_RATING_POINT: f64 = 20.0;

/// Maps one indicator to one feed report. Every indicator yields a report;
/// types without a supported IOC kind yield a report with no IOCs.
pub fn to_report(indicator: &RawIndicator) -> Report {
  let title = indicator
    .description
    .as_deref()
    .filter(|d| !d.is_empty())
    .unwrap_or(FALLBACK_TITLE)
    .to_string();

  let mut iocs = Iocs::new();
  if let Some(kind) = ioc_kind(&indicator.kind, &indicator.value) {
    iocs.insert(kind, BTreeSet::from([indicator.value.clone()]));
  }

  Report {
    id: indicator.id.clone(),
    link: indicator.web_link.clone().unwrap_or_default(),
    title,
    score: score(indicator.rating),
    timestamp: indicator.date_added,
    iocs,
  }
}

pub fn to_reports(indicators: &[RawIndicator]) -> Vec<Report> {
  indicators.iter().map(to_report).collect()
}

/// Half-point ratings keep their fraction: 4.5 scores 90.
pub fn score(rating: f64) -> i32 {
  (rating * SCORE_PER_RATING_POINT).round() as i32
}

fn ioc_kind(kind: &IndicatorType, value: &str) -> Option<IocKind> {
  match kind {
    IndicatorType::File => Some(IocKind::Md5),
    IndicatorType::Address if value.parse::<Ipv6Addr>().is_ok() => Some(IocKind::Ipv6),
    IndicatorType::Address => Some(IocKind::Ipv4),
    IndicatorType::Host => Some(IocKind::Dns),
    IndicatorType::Other(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn indicator(kind: IndicatorType, value: &str) -> RawIndicator {
    RawIndicator {
      id: "7".to_string(),
      kind,
      value: value.to_string(),
      rating: 3.0,
      description: None,
      web_link: Some("https://app.threatconnect.com/i/7".to_string()),
      date_added: 1_700_000_000,
    }
  }

  #[test]
  fn score_is_rating_times_twenty() {
    let expected = [0, 20, 40, 60, 80, 100];
    for (rating, want) in (0u8..=5).zip(expected) {
      let mut ind = indicator(IndicatorType::Host, "evil.example");
      ind.rating = f64::from(rating);
      assert_eq!(to_report(&ind).score, want);
    }
  }

  #[test]
  fn half_point_rating_keeps_its_fraction() {
    assert_eq!(score(4.5), 90);
    assert_eq!(score(0.5), 10);
  }

  #[test]
  fn ipv6_address_maps_to_ipv6_ioc() {
    let report = to_report(&indicator(IndicatorType::Address, "2001:db8::1"));
    assert_eq!(report.iocs.len(), 1);
    assert_eq!(
      report.iocs[&IocKind::Ipv6],
      BTreeSet::from(["2001:db8::1".to_string()])
    );
  }

  #[test]
  fn each_type_populates_exactly_one_ioc_kind() {
    let cases = [
      (IndicatorType::File, "d41d8cd98f00b204e9800998ecf8427e", IocKind::Md5),
      (IndicatorType::Address, "1.2.3.4", IocKind::Ipv4),
      (IndicatorType::Host, "evil.example", IocKind::Dns),
    ];
    for (kind, value, ioc) in cases {
      let report = to_report(&indicator(kind, value));
      assert_eq!(report.iocs.len(), 1);
      assert_eq!(report.iocs[&ioc], BTreeSet::from([value.to_string()]));
    }
  }

  #[test]
  fn unknown_type_yields_report_without_iocs() {
    let report = to_report(&indicator(IndicatorType::Other("Url".to_string()), "http://x"));
    assert!(report.iocs.is_empty());
    assert_eq!(report.id, "7");
  }

  #[test]
  fn title_prefers_description_then_falls_back_to_empty() {
    let mut ind = indicator(IndicatorType::Address, "1.2.3.4");
    assert_eq!(to_report(&ind).title, FALLBACK_TITLE);

    ind.description = Some(String::new());
    assert_eq!(to_report(&ind).title, FALLBACK_TITLE);

    ind.description = Some("C2 server".to_string());
    assert_eq!(to_report(&ind).title, "C2 server");
  }

  #[test]
  fn copies_identity_link_and_timestamp() {
    let mut ind = indicator(IndicatorType::Address, "1.2.3.4");
    let report = to_report(&ind);
    assert_eq!(report.link, "https://app.threatconnect.com/i/7");
    assert_eq!(report.timestamp, 1_700_000_000);

    ind.web_link = None;
    assert_eq!(to_report(&ind).link, "");
  }

  #[test]
  fn duplicates_pass_through() {
    let ind = indicator(IndicatorType::Address, "1.2.3.4");
    let reports = to_reports(&[ind.clone(), ind]);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0], reports[1]);
  }
}
