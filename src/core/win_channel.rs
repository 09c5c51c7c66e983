//! Live Windows channel backend over the Evt* API.
//!
//! Implements [`LogSource`] by querying a channel with
//! `EvtQueryReverseDirection` (the API-level form of the backward
//! sequential read), pulling handle batches with `EvtNext`, rendering each
//! event to XML with `EvtRender`, and projecting the XML onto [`RawEntry`].
//! Message text comes from `EvtFormatMessage` with a publisher-metadata
//! handle cache; events whose provider metadata is unavailable fall back to
//! their insertion strings. `count()` uses the legacy
//! `GetNumberOfEventLogRecords` since the Evt* API exposes no total.
//!
//! Only compiled on Windows; other hosts use the JSONL backend.

use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};
use windows::core::PCWSTR;
use windows::Win32::System::EventLog::{
    CloseEventLog, EvtClose, EvtFormatMessage, EvtFormatMessageEvent, EvtNext,
    EvtOpenPublisherMetadata, EvtQuery, EvtQueryChannelPath, EvtQueryReverseDirection, EvtRender,
    EvtRenderEventXml, GetNumberOfEventLogRecords, OpenEventLogW, EVT_HANDLE,
};

use crate::core::event_record::RawEntry;
use crate::core::log_source::LogSource;
use crate::util::error::{HarvestError, Result};
use crate::util::time::TimeLayout;

/// Timeout in milliseconds passed to `EvtNext`; a finite timeout keeps a
/// stalled channel from blocking the scan forever.
const EVT_NEXT_TIMEOUT_MS: u32 = 1000;

/// Buffer size (in `u16` units) for `EvtRender` output. Grows on demand and
/// is reused across all events of a scan.
const EVT_RENDER_BUFFER_SIZE: usize = 8_192;

/// Buffer size (in `u16` units) for `EvtFormatMessage` output.
const EVT_FORMAT_BUFFER_SIZE: usize = 2_048;

/// A live Windows Event Log channel.
pub struct EvtChannel {
    /// Open query handle, reverse (newest-first) direction. `None` = Closed.
    query: Option<EVT_HANDLE>,
    channel: String,
    /// Publisher metadata handles keyed by provider name.
    /// `EVT_HANDLE(0)` marks a provider whose metadata failed to open.
    publisher_cache: HashMap<String, EVT_HANDLE>,
    render_buf: Vec<u16>,
    format_buf: Vec<u16>,
}

impl EvtChannel {
    /// Create a source in the Closed state.
    pub fn new() -> Self {
        Self {
            query: None,
            channel: String::new(),
            publisher_cache: HashMap::new(),
            render_buf: Vec::new(),
            format_buf: Vec::new(),
        }
    }
}

impl Default for EvtChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSource for EvtChannel {
    fn open(&mut self, channel: &str) -> Result<()> {
        if self.query.is_some() {
            return Err(HarvestError::Open {
                channel: channel.to_string(),
                detail: "source is already open".into(),
            });
        }

        let channel_wide = to_wide(channel);
        let query_wide = to_wide("*");

        // SAFETY: both strings are null-terminated UTF-16. The session
        // handle is None (local machine). Flags request channel-path mode
        // with reverse (newest-first) ordering.
        let query = unsafe {
            EvtQuery(
                None,
                PCWSTR(channel_wide.as_ptr()),
                PCWSTR(query_wide.as_ptr()),
                EvtQueryChannelPath.0 | EvtQueryReverseDirection.0,
            )
        }
        .map_err(|e| HarvestError::Open {
            channel: channel.to_string(),
            detail: format!("EvtQuery failed (HRESULT 0x{:08X})", e.code().0 as u32),
        })?;

        self.query = Some(query);
        self.channel = channel.to_string();
        tracing::debug!("Opened channel '{channel}' (reverse direction)");
        Ok(())
    }

    fn read_backward(&mut self, batch_size: usize) -> Result<Vec<RawEntry>> {
        let query = self.query.ok_or_else(|| HarvestError::Read {
            channel: "(closed)".into(),
            detail: "channel is not open".into(),
        })?;

        let mut handles = vec![0isize; batch_size.max(1)];
        let mut returned = 0u32;

        // SAFETY: query is a valid handle from EvtQuery; handles has
        // batch_size slots; returned receives the actual count.
        let result = unsafe {
            EvtNext(
                query,
                &mut handles,
                EVT_NEXT_TIMEOUT_MS,
                0,
                &mut returned,
            )
        };

        match result {
            Ok(()) if returned == 0 => return Ok(Vec::new()),
            Ok(()) => {}
            Err(e) => {
                let code = e.code().0 as u32;
                // ERROR_NO_MORE_ITEMS / ERROR_TIMEOUT mark normal exhaustion.
                if code == 0x80070103 || code == 0x800705B4 {
                    return Ok(Vec::new());
                }
                return Err(HarvestError::Read {
                    channel: self.channel.clone(),
                    detail: format!("EvtNext failed (HRESULT 0x{code:08X})"),
                });
            }
        }

        let mut batch = Vec::with_capacity(returned as usize);
        for &event_handle in &handles[..returned as usize] {
            match self.project_event(event_handle) {
                Ok(entry) => batch.push(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable event: {e}");
                }
            }
            // SAFETY: event_handle came from EvtNext and is no longer used.
            unsafe {
                let _ = EvtClose(EVT_HANDLE(event_handle));
            }
        }
        Ok(batch)
    }

    fn count(&mut self) -> Result<u64> {
        if self.query.is_none() {
            return Err(HarvestError::Read {
                channel: "(closed)".into(),
                detail: "channel is not open".into(),
            });
        }

        let channel_wide = to_wide(&self.channel);
        // SAFETY: null server = local machine; the source name is a
        // null-terminated UTF-16 string.
        let legacy = unsafe { OpenEventLogW(PCWSTR::null(), PCWSTR(channel_wide.as_ptr())) }
            .map_err(|e| HarvestError::Read {
                channel: self.channel.clone(),
                detail: format!("OpenEventLogW failed (HRESULT 0x{:08X})", e.code().0 as u32),
            })?;

        let mut total = 0u32;
        // SAFETY: legacy is a valid handle; total receives the count.
        let result = unsafe { GetNumberOfEventLogRecords(legacy, &mut total) };
        // SAFETY: we opened legacy above and are done with it.
        unsafe {
            let _ = CloseEventLog(legacy);
        }
        result.map_err(|e| HarvestError::Read {
            channel: self.channel.clone(),
            detail: format!(
                "GetNumberOfEventLogRecords failed (HRESULT 0x{:08X})",
                e.code().0 as u32
            ),
        })?;
        Ok(u64::from(total))
    }

    fn close(&mut self) {
        if let Some(query) = self.query.take() {
            // SAFETY: query is the handle we opened in open().
            unsafe {
                let _ = EvtClose(query);
            }
            tracing::debug!("Closed channel '{}'", self.channel);
        }
        for (_, handle) in self.publisher_cache.drain() {
            if handle.0 != 0 {
                // SAFETY: non-zero cached handles came from
                // EvtOpenPublisherMetadata.
                unsafe {
                    let _ = EvtClose(handle);
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.query.is_some()
    }
}

impl Drop for EvtChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl EvtChannel {
    /// Render one event handle to XML and project it onto a [`RawEntry`].
    fn project_event(&mut self, event_handle: isize) -> Result<RawEntry> {
        let xml = self.render_event_xml(event_handle)?;
        let formatted = self.try_format_message(event_handle, &xml);
        raw_entry_from_xml(&xml, formatted)
    }

    /// Render a single event handle to an XML string via `EvtRender`.
    ///
    /// Reuses `self.render_buf` across events; the buffer grows on demand
    /// and retains its size for subsequent calls.
    fn render_event_xml(&mut self, event_handle: isize) -> Result<String> {
        if self.render_buf.len() < EVT_RENDER_BUFFER_SIZE {
            self.render_buf.resize(EVT_RENDER_BUFFER_SIZE, 0);
        }
        let mut buffer_used = 0u32;
        let mut property_count = 0u32;

        // SAFETY: event_handle is valid, buffer is properly sized.
        // EvtRenderEventXml renders the event as null-terminated UTF-16.
        let result = unsafe {
            EvtRender(
                None,
                EVT_HANDLE(event_handle),
                EvtRenderEventXml.0,
                (self.render_buf.len() * 2) as u32,
                Some(self.render_buf.as_mut_ptr() as *mut _),
                &mut buffer_used,
                &mut property_count,
            )
        };

        if let Err(e) = result {
            let code = e.code().0 as u32;
            // ERROR_INSUFFICIENT_BUFFER surfaces as HRESULT 0x8007007A:
            // grow and retry once.
            if code == 0x8007007A {
                let needed = (buffer_used as usize / 2) + 1;
                self.render_buf.resize(needed, 0);
                // SAFETY: retrying with the grown buffer.
                unsafe {
                    EvtRender(
                        None,
                        EVT_HANDLE(event_handle),
                        EvtRenderEventXml.0,
                        (self.render_buf.len() * 2) as u32,
                        Some(self.render_buf.as_mut_ptr() as *mut _),
                        &mut buffer_used,
                        &mut property_count,
                    )
                }
                .map_err(|e| HarvestError::Read {
                    channel: self.channel.clone(),
                    detail: format!("EvtRender retry failed (HRESULT 0x{:08X})", e.code().0 as u32),
                })?;
            } else {
                return Err(HarvestError::Read {
                    channel: self.channel.clone(),
                    detail: format!("EvtRender failed (HRESULT 0x{code:08X})"),
                });
            }
        }

        // buffer_used is in bytes; strip the null terminator.
        let used_u16 = buffer_used as usize / 2;
        let end = if used_u16 > 0 && self.render_buf[used_u16 - 1] == 0 {
            used_u16 - 1
        } else {
            used_u16
        };
        Ok(String::from_utf16_lossy(&self.render_buf[..end]))
    }

    /// Attempt to format the event message via `EvtFormatMessage`.
    ///
    /// Returns `None` if formatting fails (common for events from
    /// uninstalled providers); the caller falls back to insertion strings.
    fn try_format_message(&mut self, event_handle: isize, xml: &str) -> Option<String> {
        let provider = extract_provider_name(xml)?;

        // A cached EVT_HANDLE(0) means this provider already failed.
        let pub_handle = match self.publisher_cache.get(&provider) {
            Some(&h) if h.0 != 0 => h,
            Some(_) => return None,
            None => {
                let provider_wide = to_wide(&provider);
                // SAFETY: provider_wide is a null-terminated UTF-16 string.
                let result = unsafe {
                    EvtOpenPublisherMetadata(None, PCWSTR(provider_wide.as_ptr()), None, 0, 0)
                };
                match result {
                    Ok(h) => {
                        self.publisher_cache.insert(provider, h);
                        h
                    }
                    Err(_) => {
                        self.publisher_cache.insert(provider, EVT_HANDLE(0));
                        return None;
                    }
                }
            }
        };

        if self.format_buf.len() < EVT_FORMAT_BUFFER_SIZE {
            self.format_buf.resize(EVT_FORMAT_BUFFER_SIZE, 0);
        }
        let mut used = 0u32;

        // SAFETY: pub_handle and event_handle are valid handles.
        // EvtFormatMessageEvent formats the event's primary message string.
        let result = unsafe {
            EvtFormatMessage(
                pub_handle,
                EVT_HANDLE(event_handle),
                0,
                None,
                EvtFormatMessageEvent.0 as u32,
                Some(self.format_buf.as_mut_slice()),
                &mut used,
            )
        };

        match result {
            Ok(()) => utf16_message(&self.format_buf, used),
            Err(e) => {
                let code = e.code().0 as u32;
                if code == 0x8007007A {
                    self.format_buf.resize(used as usize + 1, 0);
                    // SAFETY: retrying with the grown buffer.
                    let retry = unsafe {
                        EvtFormatMessage(
                            pub_handle,
                            EVT_HANDLE(event_handle),
                            0,
                            None,
                            EvtFormatMessageEvent.0 as u32,
                            Some(self.format_buf.as_mut_slice()),
                            &mut used,
                        )
                    };
                    if retry.is_ok() {
                        return utf16_message(&self.format_buf, used);
                    }
                }
                None
            }
        }
    }
}

/// Trim a formatted UTF-16 message buffer to a non-empty `String`.
fn utf16_message(buffer: &[u16], used: u32) -> Option<String> {
    let end = if used > 0 { used as usize - 1 } else { 0 };
    let msg = String::from_utf16_lossy(&buffer[..end]);
    let trimmed = msg.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Project rendered event XML onto the source-layout [`RawEntry`].
fn raw_entry_from_xml(xml: &str, formatted_message: Option<String>) -> Result<RawEntry> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| HarvestError::Normalize {
        field: "raw_entry",
        detail: format!("event XML did not parse: {e}"),
    })?;
    let root = doc.root_element();
    let system = find_child(&root, "System").ok_or_else(|| HarvestError::Normalize {
        field: "raw_entry",
        detail: "missing <System> element".into(),
    })?;

    let source_name = find_child(&system, "Provider")
        .and_then(|p| p.attribute("Name").map(String::from))
        .unwrap_or_default();

    // Reconstruct the composite identifier: qualifiers << 16 | code.
    let event_id_node = find_child(&system, "EventID");
    let code: u32 = event_id_node
        .and_then(|e| e.text())
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0);
    let qualifiers: u32 = event_id_node
        .and_then(|e| e.attribute("Qualifiers"))
        .and_then(|q| q.trim().parse().ok())
        .unwrap_or(0);
    let event_id = (qualifiers << 16) | (code & 0xFFFF);

    let level: u8 = find_child(&system, "Level")
        .and_then(|e| e.text())
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0);

    let keywords: u64 = find_child(&system, "Keywords")
        .and_then(|e| e.text())
        .and_then(|t| {
            let t = t.trim().trim_start_matches("0x").trim_start_matches("0X");
            u64::from_str_radix(t, 16).ok()
        })
        .unwrap_or(0);

    let time_generated = find_child(&system, "TimeCreated")
        .and_then(|e| e.attribute("SystemTime"))
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
        .with_timezone(&Local)
        .naive_local()
        .format(TimeLayout::Numeric.pattern())
        .to_string();

    let computer_name = find_child(&system, "Computer")
        .and_then(|e| e.text())
        .unwrap_or("")
        .to_string();

    let category: u16 = find_child(&system, "Task")
        .and_then(|e| e.text())
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0);

    let record_number: u32 = find_child(&system, "EventRecordID")
        .and_then(|e| e.text())
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0);

    let string_inserts = event_data_values(&root);

    // Fall back to joined insertion strings when provider metadata is
    // unavailable on this machine.
    let message = formatted_message.unwrap_or_else(|| string_inserts.join("; "));

    Ok(RawEntry {
        time_generated,
        event_id,
        event_type_flag: legacy_type_flag(level, keywords),
        computer_name,
        source_name,
        category,
        record_number,
        message,
        string_inserts,
    })
}

/// Derive the legacy type flag from the modern level/keywords pair.
///
/// Audit outcomes live in the standard keywords bits (audit success bit 53,
/// audit failure bit 52); everything else maps by level.
fn legacy_type_flag(level: u8, keywords: u64) -> u16 {
    const KEYWORD_AUDIT_SUCCESS: u64 = 0x0020_0000_0000_0000;
    const KEYWORD_AUDIT_FAILURE: u64 = 0x0010_0000_0000_0000;

    if keywords & KEYWORD_AUDIT_FAILURE != 0 {
        return 0x0010;
    }
    if keywords & KEYWORD_AUDIT_SUCCESS != 0 {
        return 0x0008;
    }
    match level {
        1 | 2 => 0x0001,     // Critical, Error
        3 => 0x0002,         // Warning
        0 | 4 | 5 => 0x0004, // LogAlways, Informational, Verbose
        _ => 0,
    }
}

/// Find a direct child element by local tag name, ignoring namespaces.
fn find_child<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

/// Collect `<EventData><Data>` values in document (positional) order.
fn event_data_values(root: &roxmltree::Node<'_, '_>) -> Vec<String> {
    let Some(event_data) = find_child(root, "EventData").or_else(|| find_child(root, "UserData"))
    else {
        return Vec::new();
    };
    event_data
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "Data")
        .map(|c| c.text().unwrap_or("").to_string())
        .collect()
}

/// Quick extraction of the `Provider Name` attribute from raw event XML,
/// avoiding a full parse just for the publisher lookup.
fn extract_provider_name(xml: &str) -> Option<String> {
    let marker = "Provider Name=\"";
    let start = xml.find(marker)? + marker.len();
    let end = xml[start..].find('"')? + start;
    Some(xml[start..end].to_string())
}

/// Convert a `&str` to a null-terminated UTF-16 vector.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_type_flag_audit_bits_win() {
        assert_eq!(legacy_type_flag(0, 0x8020_0000_0000_0000), 0x0008);
        assert_eq!(legacy_type_flag(0, 0x8010_0000_0000_0000), 0x0010);
        // Audit bits take precedence over level.
        assert_eq!(legacy_type_flag(2, 0x8020_0000_0000_0000), 0x0008);
    }

    #[test]
    fn test_legacy_type_flag_by_level() {
        assert_eq!(legacy_type_flag(2, 0), 0x0001);
        assert_eq!(legacy_type_flag(3, 0), 0x0002);
        assert_eq!(legacy_type_flag(4, 0), 0x0004);
    }

    #[test]
    fn test_raw_entry_from_xml() {
        let xml = r#"<Event xmlns="http://schemas.microsoft.com/win/2004/08/events/event">
  <System>
    <Provider Name="Microsoft-Windows-Security-Auditing" />
    <EventID Qualifiers="2">4624</EventID>
    <Level>0</Level>
    <Task>12544</Task>
    <Keywords>0x8020000000000000</Keywords>
    <TimeCreated SystemTime="2026-08-04T10:23:45.1234567Z" />
    <EventRecordID>918273</EventRecordID>
    <Computer>WKS-07</Computer>
  </System>
  <EventData>
    <Data Name="SubjectUserSid">S-1-5-18</Data>
    <Data Name="SubjectUserName">svc_backup</Data>
  </EventData>
</Event>"#;
        let entry = raw_entry_from_xml(xml, Some("An account was successfully logged on.".into()))
            .expect("well-formed XML projects");
        assert_eq!(entry.event_id, (2 << 16) | 4624);
        assert_eq!(entry.event_type_flag, 0x0008);
        assert_eq!(entry.computer_name, "WKS-07");
        assert_eq!(entry.string_inserts[1], "svc_backup");
        assert_eq!(entry.record_number, 918_273);
    }

    #[test]
    fn test_extract_provider_name() {
        let xml = r#"<Event><System><Provider Name="TestProvider" /></System></Event>"#;
        assert_eq!(extract_provider_name(xml), Some("TestProvider".into()));
        assert_eq!(extract_provider_name("<Event></Event>"), None);
    }
}
