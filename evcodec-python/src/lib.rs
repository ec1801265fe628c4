//! Python bindings for the event packet decoders with numpy support.
//!
//! Decoded events are handed out in columnar form: one numpy array per field,
//! built once when the events are drained.

use evcodec_core::{
    CdEvent, DecodeError, DedupPolicy, Decoder as CoreDecoder, PacketView, TriggerEvent,
    UniqueDecoder as CoreUniqueDecoder,
};
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};

fn to_py_err(err: DecodeError) -> PyErr {
    match err {
        DecodeError::CorruptStream { .. } => PyRuntimeError::new_err(err.to_string()),
        DecodeError::UnsupportedEncoding(_) | DecodeError::InvalidGeometry { .. } => {
            PyValueError::new_err(err.to_string())
        }
    }
}

/// Runs `f` on a packet built from a message object's attributes.
///
/// The message needs `encoding`, `width`, `height`, `time_base` and `events`;
/// `events` may be `bytes`, a uint8 numpy array or any sequence of ints.
fn with_message<R>(msg: &PyAny, f: impl FnOnce(&PacketView<'_>) -> R) -> PyResult<R> {
    let encoding: String = msg.getattr("encoding")?.extract()?;
    let width: u16 = msg.getattr("width")?.extract()?;
    let height: u16 = msg.getattr("height")?.extract()?;
    let time_base: i64 = msg.getattr("time_base")?.extract()?;
    let events = msg.getattr("events")?;

    if let Ok(bytes) = events.downcast::<PyBytes>() {
        let packet = PacketView::new(&encoding, width, height, time_base, bytes.as_bytes());
        return Ok(f(&packet));
    }
    if let Ok(array) = events.extract::<PyReadonlyArray1<'_, u8>>() {
        if let Ok(slice) = array.as_slice() {
            return Ok(f(&PacketView::new(&encoding, width, height, time_base, slice)));
        }
        let owned = array.as_array().to_vec();
        return Ok(f(&PacketView::new(&encoding, width, height, time_base, &owned)));
    }
    let owned: Vec<u8> = events.extract()?;
    Ok(f(&PacketView::new(&encoding, width, height, time_base, &owned)))
}

/// Decoded CD events as numpy columns `x`, `y`, `p` and `t`.
#[pyclass]
pub struct CdEvents {
    x: Py<PyArray1<u16>>,
    y: Py<PyArray1<u16>>,
    p: Py<PyArray1<u8>>,
    t: Py<PyArray1<i64>>,
    len: usize,
}

#[pymethods]
impl CdEvents {
    fn __len__(&self) -> usize {
        self.len
    }

    fn __repr__(&self) -> String {
        format!("CdEvents(count={})", self.len)
    }

    #[getter]
    fn x<'py>(&'py self, py: Python<'py>) -> &'py PyArray1<u16> {
        self.x.as_ref(py)
    }

    #[getter]
    fn y<'py>(&'py self, py: Python<'py>) -> &'py PyArray1<u16> {
        self.y.as_ref(py)
    }

    /// Polarities: 0 = OFF (decrease in brightness), 1 = ON (increase)
    #[getter]
    fn p<'py>(&'py self, py: Python<'py>) -> &'py PyArray1<u8> {
        self.p.as_ref(py)
    }

    /// Absolute sensor timestamps
    #[getter]
    fn t<'py>(&'py self, py: Python<'py>) -> &'py PyArray1<i64> {
        self.t.as_ref(py)
    }

    /// Returns all arrays as a dictionary, e.g. for a pandas DataFrame.
    fn to_dict(&self, py: Python<'_>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        dict.set_item("x", self.x.as_ref(py))?;
        dict.set_item("y", self.y.as_ref(py))?;
        dict.set_item("p", self.p.as_ref(py))?;
        dict.set_item("t", self.t.as_ref(py))?;
        Ok(dict.into())
    }
}

impl CdEvents {
    fn from_events(py: Python<'_>, events: Vec<CdEvent>) -> Self {
        let len = events.len();
        let mut x = Vec::with_capacity(len);
        let mut y = Vec::with_capacity(len);
        let mut p = Vec::with_capacity(len);
        let mut t = Vec::with_capacity(len);

        for event in events {
            x.push(event.x);
            y.push(event.y);
            p.push(event.polarity);
            t.push(event.t);
        }

        Self {
            x: x.into_pyarray(py).to_owned(),
            y: y.into_pyarray(py).to_owned(),
            p: p.into_pyarray(py).to_owned(),
            t: t.into_pyarray(py).to_owned(),
            len,
        }
    }
}

/// Decoded trigger events as numpy columns `p`, `t` and `id`.
#[pyclass]
pub struct TriggerEvents {
    p: Py<PyArray1<u8>>,
    t: Py<PyArray1<i64>>,
    id: Py<PyArray1<u8>>,
    len: usize,
}

#[pymethods]
impl TriggerEvents {
    fn __len__(&self) -> usize {
        self.len
    }

    fn __repr__(&self) -> String {
        format!("TriggerEvents(count={})", self.len)
    }

    /// Edge polarities: 0 = rising, 1 = falling
    #[getter]
    fn p<'py>(&'py self, py: Python<'py>) -> &'py PyArray1<u8> {
        self.p.as_ref(py)
    }

    #[getter]
    fn t<'py>(&'py self, py: Python<'py>) -> &'py PyArray1<i64> {
        self.t.as_ref(py)
    }

    #[getter]
    fn id<'py>(&'py self, py: Python<'py>) -> &'py PyArray1<u8> {
        self.id.as_ref(py)
    }
}

impl TriggerEvents {
    fn from_events(py: Python<'_>, events: Vec<TriggerEvent>) -> Self {
        let len = events.len();
        let mut p = Vec::with_capacity(len);
        let mut t = Vec::with_capacity(len);
        let mut id = Vec::with_capacity(len);

        for event in events {
            p.push(event.polarity);
            t.push(event.t);
            id.push(event.id);
        }

        Self {
            p: p.into_pyarray(py).to_owned(),
            t: t.into_pyarray(py).to_owned(),
            id: id.into_pyarray(py).to_owned(),
            len,
        }
    }
}

/// Defines a Python decoder class around a core decoder. Extra methods, such
/// as the constructor, go in the trailing block.
macro_rules! py_decoder {
    ($(#[$meta:meta])* $name:ident($inner:ty) { $($extra:tt)* }) => {
        $(#[$meta])*
        #[pyclass]
        pub struct $name {
            inner: $inner,
        }

        #[pymethods]
        impl $name {
            $($extra)*

            /// Decodes a whole packet message.
            fn decode(&mut self, py: Python<'_>, msg: &PyAny) -> PyResult<()> {
                let inner = &mut self.inner;
                with_message(msg, |packet| py.allow_threads(|| inner.decode(packet)))?
                    .map_err(to_py_err)
            }

            /// Decodes a packet given as loose header fields and a bytes payload.
            fn decode_bytes(
                &mut self,
                py: Python<'_>,
                encoding: &str,
                width: u16,
                height: u16,
                time_base: i64,
                events: &[u8],
            ) -> PyResult<()> {
                py.allow_threads(|| {
                    self.inner
                        .decode_bytes(encoding, width, height, time_base, events)
                })
                .map_err(to_py_err)
            }

            /// Decodes a packet whose payload is a uint8 numpy array.
            fn decode_array(
                &mut self,
                py: Python<'_>,
                encoding: &str,
                width: u16,
                height: u16,
                time_base: i64,
                events: PyReadonlyArray1<'_, u8>,
            ) -> PyResult<()> {
                let events = events.as_array();
                py.allow_threads(|| {
                    self.inner
                        .decode_array(encoding, width, height, time_base, events)
                })
                .map_err(to_py_err)
            }

            /// Decodes up to, but excluding, the first event at or after
            /// `until_time`. Returns `(reached_limit, next_time)`.
            fn decode_until(
                &mut self,
                py: Python<'_>,
                msg: &PyAny,
                until_time: i64,
            ) -> PyResult<(bool, i64)> {
                let inner = &mut self.inner;
                with_message(msg, |packet| {
                    py.allow_threads(|| inner.decode_until(packet, until_time))
                })?
                .map(Into::into)
                .map_err(to_py_err)
            }

            /// Time of the first event in the message, or None if it holds no
            /// events. Does not change the decoder.
            fn find_first_sensor_time(&self, msg: &PyAny) -> PyResult<Option<i64>> {
                with_message(msg, |packet| self.inner.find_first_sensor_time(packet))?
                    .map_err(to_py_err)
            }

            fn get_cd_events(&mut self, py: Python<'_>) -> PyResult<Py<CdEvents>> {
                Py::new(py, CdEvents::from_events(py, self.inner.get_cd_events()))
            }

            fn get_ext_trig_events(&mut self, py: Python<'_>) -> PyResult<Py<TriggerEvents>> {
                Py::new(
                    py,
                    TriggerEvents::from_events(py, self.inner.get_ext_trig_events()),
                )
            }

            /// One `CdEvents` per decoded packet.
            fn get_cd_event_packets(&mut self, py: Python<'_>) -> PyResult<Vec<Py<CdEvents>>> {
                self.inner
                    .get_cd_event_packets()
                    .into_iter()
                    .map(|events| Py::new(py, CdEvents::from_events(py, events)))
                    .collect()
            }

            fn get_ext_trig_event_packets(
                &mut self,
                py: Python<'_>,
            ) -> PyResult<Vec<Py<TriggerEvents>>> {
                self.inner
                    .get_ext_trig_event_packets()
                    .into_iter()
                    .map(|events| Py::new(py, TriggerEvents::from_events(py, events)))
                    .collect()
            }

            fn get_num_cd_on(&self) -> u64 {
                self.inner.get_num_cd_on()
            }

            fn get_num_cd_off(&self) -> u64 {
                self.inner.get_num_cd_off()
            }

            fn get_num_trigger_rising(&self) -> u64 {
                self.inner.get_num_trigger_rising()
            }

            fn get_num_trigger_falling(&self) -> u64 {
                self.inner.get_num_trigger_falling()
            }

            /// Time base of the packet being decoded, or None before the
            /// first decode.
            fn get_start_time(&self) -> Option<i64> {
                self.inner.get_start_time()
            }
        }
    };
}

py_decoder! {
    /// Regular event packet decoder.
    ///
    /// Example:
    ///     >>> import evcodec
    ///     >>> decoder = evcodec.Decoder()
    ///     >>> decoder.decode(msg)
    ///     >>> cd = decoder.get_cd_events()
    ///     >>> print(f"Decoded {len(cd)} events, ON: {decoder.get_num_cd_on()}")
    Decoder(CoreDecoder) {
        #[new]
        fn new() -> Self {
            Self {
                inner: CoreDecoder::new(),
            }
        }

        fn __repr__(&self) -> String {
            format!("{:?}", self.inner)
        }
    }
}

py_decoder! {
    /// Decoder that never repeats a pixel address within one output packet.
    ///
    /// By default only the latest event per pixel is kept. With
    /// `split_packets=True` every event is kept and a new packet starts at
    /// each repeated address instead.
    UniqueDecoder(CoreUniqueDecoder) {
        #[new]
        #[pyo3(signature = (split_packets = false))]
        fn new(split_packets: bool) -> Self {
            let policy = if split_packets {
                DedupPolicy::SplitPackets
            } else {
                DedupPolicy::KeepLatest
            };
            Self {
                inner: CoreUniqueDecoder::with_policy(policy),
            }
        }

        fn __repr__(&self) -> String {
            format!("{:?}", self.inner)
        }

        /// Number of CD events dropped as repeats.
        fn get_num_cd_suppressed(&self) -> u64 {
            self.inner.get_num_cd_suppressed()
        }
    }
}

/// Event camera packet decoder module for Python.
#[pymodule]
fn evcodec(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_class::<Decoder>()?;
    m.add_class::<UniqueDecoder>()?;
    m.add_class::<CdEvents>()?;
    m.add_class::<TriggerEvents>()?;
    m.add("NO_EVENT_TIME", evcodec_core::NO_EVENT_TIME)?;
    Ok(())
}
