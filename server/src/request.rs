//! Line-oriented request parsing.
//!
//! A request is a minimal header block: only the first line carries
//! meaning, dispatched on a case-sensitive method/path prefix. Control
//! paths pack their parameters into positional path segments:
//!
//! ```text
//! POST /control/<id>/<w>/<h>/<topx>/<topy>/<botx>/<boty>/<res>
//! GET  /control/<id>/<w>/<h>/<topx>/<topy>/<botx>/<boty>/<res>/<mask>
//! ```
//!
//! A POST carries no mask and implies all groups selected.

use crate::registry::ChannelId;
use shared::{Point, ViewRequest, ViewRequestError};
use thiserror::Error;

/// Mask implied by a POST control request.
pub const ALL_GROUPS_MASK: u32 = u32::MAX;

const CONTROL_PREFIX: &str = "/control/";
const FIELD_NAMES: [&str; 8] = ["id", "w", "h", "topx", "topy", "botx", "boty", "res"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("control path has {0} fields, expected 8 or 9")]
    FieldCount(usize),
    #[error("control field '{0}' is not a valid integer")]
    BadField(&'static str),
    #[error(transparent)]
    InvalidView(#[from] ViewRequestError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    /// `GET|POST /data...` — establish this connection as a data channel.
    OpenData,
    /// `GET /control/html...` — serve the static control page.
    ControlPage,
    /// A parsed view update addressed at a data channel.
    Control { target: ChannelId, view: ViewRequest },
    /// A control path whose fields failed to parse or validate.
    Malformed(RequestError),
    /// Anything else; answered not-found and the connection is closed.
    Unknown,
}

pub fn parse_request(line: &str) -> Request {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return Request::Unknown;
    };
    match method {
        "GET" | "POST" if path.starts_with("/data") => Request::OpenData,
        "GET" if path.starts_with("/control/html") => Request::ControlPage,
        "POST" if path.starts_with(CONTROL_PREFIX) => parse_control(path, false),
        "GET" if path.starts_with(CONTROL_PREFIX) => parse_control(path, true),
        _ => Request::Unknown,
    }
}

fn parse_control(path: &str, with_mask: bool) -> Request {
    match control_fields(path, with_mask) {
        Ok(request) => request,
        Err(error) => Request::Malformed(error),
    }
}

fn control_fields(path: &str, with_mask: bool) -> Result<Request, RequestError> {
    let fields: Vec<&str> = path[CONTROL_PREFIX.len()..].split('/').collect();
    let expected = FIELD_NAMES.len() + usize::from(with_mask);
    if fields.len() != expected {
        return Err(RequestError::FieldCount(fields.len()));
    }

    let mut values = [0i32; FIELD_NAMES.len()];
    for (value, (field, name)) in values.iter_mut().zip(fields.iter().zip(FIELD_NAMES)) {
        *value = field
            .parse::<i32>()
            .map_err(|_| RequestError::BadField(name))?;
    }
    let [id, w, h, topx, topy, botx, boty, res] = values;

    let mask = if with_mask {
        fields[FIELD_NAMES.len()]
            .parse::<u32>()
            .map_err(|_| RequestError::BadField("mask"))?
    } else {
        ALL_GROUPS_MASK
    };
    let target = ChannelId::try_from(id).map_err(|_| RequestError::BadField("id"))?;

    let view = ViewRequest {
        view: Point::new(w, h),
        frame_top: Point::new(topx, topy),
        frame_bottom: Point::new(botx, boty),
        resolution: res,
        mask,
    };
    view.validate()?;
    Ok(Request::Control { target, view })
}
