use anyhow::Context;
use chrono::{
  DateTime,
  Local,
  SecondsFormat,
  SubsecRound,
  Utc
};

/// Stored timestamps carry millisecond precision, so anything we stamp
/// is truncated first to keep a save/load cycle lossless.
pub fn stamp(
  now: DateTime<Utc>
) -> DateTime<Utc> {
  now.trunc_subsecs(3)
}

pub fn format_iso(
  dt: &DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

pub fn parse_iso(
  raw: &str
) -> anyhow::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(
    raw.trim()
  )
  .map(|dt| dt.with_timezone(&Utc))
  .with_context(|| {
    format!(
      "invalid ISO-8601 timestamp: \
       {raw}"
    )
  })
}

/// Stand-in for a creation time that was lost or never recorded.
pub fn unknown_stamp() -> DateTime<Utc> {
  DateTime::<Utc>::UNIX_EPOCH
}

pub fn format_local(
  dt: &DateTime<Utc>
) -> String {
  dt.with_timezone(&Local)
    .format("%b %-d, %Y, %I:%M %p")
    .to_string()
}

pub fn epoch_millis(
  dt: &DateTime<Utc>
) -> u64 {
  u64::try_from(dt.timestamp_millis())
    .unwrap_or(0)
}

pub mod iso8601_serde {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso(dt)
    )
  }

  /// Lenient: a missing, non-string or unparseable stamp becomes
  /// [`super::unknown_stamp`] so one bad field does not cost the task.
  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = serde_json::Value::deserialize(
      deserializer
    )?;
    let parsed = raw
      .as_str()
      .map(super::parse_iso);
    match parsed {
      | Some(Ok(dt)) => Ok(dt),
      | Some(Err(err)) => {
        tracing::warn!(
          error = %format!("{err:#}"),
          "unreadable createdAt; \
           using epoch"
        );
        Ok(super::unknown_stamp())
      }
      | None => {
        tracing::warn!(
          value = %raw,
          "createdAt is not a string; \
           using epoch"
        );
        Ok(super::unknown_stamp())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    epoch_millis,
    format_iso,
    parse_iso,
    stamp
  };

  #[test]
  fn formats_with_millis_and_zulu() {
    let dt = Utc
      .with_ymd_and_hms(
        2024, 5, 1, 9, 30, 0
      )
      .single()
      .expect("valid date");
    assert_eq!(
      format_iso(&dt),
      "2024-05-01T09:30:00.000Z"
    );
  }

  #[test]
  fn parses_offsets_into_utc() {
    let parsed = parse_iso(
      "2024-05-01T11:30:00.250+02:00"
    )
    .expect("parse offset");
    assert_eq!(
      format_iso(&parsed),
      "2024-05-01T09:30:00.250Z"
    );
  }

  #[derive(serde::Deserialize)]
  struct Stamped {
    #[serde(
      default = "super::unknown_stamp",
      with = "super::iso8601_serde"
    )]
    at: chrono::DateTime<Utc>
  }

  #[test]
  fn bad_or_missing_stamps_fall_back_to_epoch() {
    for raw in [
      r#"{"at":"last tuesday"}"#,
      r#"{"at":1700000000000}"#,
      r#"{}"#
    ] {
      let stamped: Stamped =
        serde_json::from_str(raw)
          .expect("lenient parse");
      assert_eq!(
        stamped.at,
        super::unknown_stamp()
      );
    }
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_iso("yesterday-ish")
        .is_err()
    );
  }

  #[test]
  fn stamp_survives_text_round_trip() {
    let now = stamp(Utc::now());
    let reparsed =
      parse_iso(&format_iso(&now))
        .expect("reparse");
    assert_eq!(reparsed, now);
    assert_eq!(
      epoch_millis(&reparsed),
      epoch_millis(&now)
    );
  }
}
