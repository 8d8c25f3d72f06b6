//! The schema owns the ordered element sequence, the trip type, the
//! wavelength and the pump list. All structural mutations go through it
//! so the interface links and the revision counter stay consistent.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::pump::Pump;

/// How the beam travels the element sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripType {
    /// Standing wave resonator: the beam reflects at the end elements
    /// and passes the middle ones twice.
    SW,
    /// Ring resonator: the beam returns to the first element after the
    /// last one.
    RR,
    /// Single pass system: the beam enters at the first element and
    /// leaves after the last one.
    SP,
}

impl TripType {
    pub fn display_name(&self) -> &'static str {
        match self {
            TripType::SW => "Standing wave system",
            TripType::RR => "Ring resonator",
            TripType::SP => "Single pass system",
        }
    }

    /// Resonator topologies have an eigenmode; single-pass schemas get
    /// their beam from a pump instead.
    pub fn is_resonator(&self) -> bool {
        !matches!(self, TripType::SP)
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    elems: Vec<Element>,
    trip_type: TripType,
    wavelength: f64,
    pumps: Vec<Pump>,
    revision: u64,
}

impl Schema {
    pub fn new(trip_type: TripType) -> Self {
        Self {
            elems: Vec::new(),
            trip_type,
            wavelength: 980e-9,
            pumps: Vec::new(),
            revision: 0,
        }
    }

    /// Monotonic change counter. Notifying mutations bump it; sweep
    /// engines use the raw setters and leave it alone, so observers
    /// never see intermediate sweep states.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn trip_type(&self) -> TripType {
        self.trip_type
    }

    pub fn set_trip_type(&mut self, trip_type: TripType) {
        self.trip_type = trip_type;
        self.apply_interface_links();
        self.revision += 1;
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn set_wavelength(&mut self, value: f64) -> Result<()> {
        if value <= 0.0 {
            bail!("Wavelength can't be zero or negative.");
        }
        self.wavelength = value;
        self.revision += 1;
        Ok(())
    }

    // --- elements ---

    pub fn count(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elems
    }

    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elems.get(index)
    }

    /// Direct mutable access for calculators that set sub-ranges.
    /// Parameter edits should go through `set_param` so interface links
    /// and the revision counter stay correct.
    pub fn element_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.elems.get_mut(index)
    }

    pub fn find_element(&self, label: &str) -> Option<usize> {
        self.elems.iter().position(|e| e.label == label)
    }

    pub fn insert_element(&mut self, index: usize, elem: Element) {
        let index = index.min(self.elems.len());
        self.elems.insert(index, elem);
        self.apply_interface_links();
        self.revision += 1;
    }

    pub fn add_element(&mut self, elem: Element) -> usize {
        let index = self.elems.len();
        self.insert_element(index, elem);
        index
    }

    pub fn remove_element(&mut self, index: usize) -> Option<Element> {
        if index >= self.elems.len() {
            return None;
        }
        let elem = self.elems.remove(index);
        self.apply_interface_links();
        self.revision += 1;
        Some(elem)
    }

    pub fn set_disabled(&mut self, index: usize, disabled: bool) -> Result<()> {
        let elem = self
            .elems
            .get_mut(index)
            .ok_or_else(|| anyhow!("No element at index {index}."))?;
        elem.disabled = disabled;
        self.apply_interface_links();
        self.revision += 1;
        Ok(())
    }

    /// First free label made of the prefix and a one-based index.
    pub fn generate_label(&self, prefix: &str) -> String {
        let mut index = 1;
        loop {
            let label = format!("{prefix}{index}");
            if self.find_element(&label).is_none() {
                return label;
            }
            index += 1;
        }
    }

    pub fn active_count(&self) -> usize {
        self.elems.iter().filter(|e| !e.disabled).count()
    }

    /// Indices of non-disabled elements in beam order.
    pub fn active_elements(&self) -> Vec<usize> {
        self.elems
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.disabled)
            .map(|(i, _)| i)
            .collect()
    }

    // --- parameters ---

    pub fn param(&self, index: usize, name: &str) -> Option<f64> {
        self.element(index).and_then(|e| e.param(name))
    }

    /// Sets an element parameter, re-applies interface links and bumps
    /// the revision.
    pub fn set_param(&mut self, index: usize, name: &str, value: f64) -> Result<()> {
        self.set_param_raw(index, name, value)?;
        self.revision += 1;
        Ok(())
    }

    /// Same as `set_param` without the revision bump; for sweep loops.
    pub fn set_param_raw(&mut self, index: usize, name: &str, value: f64) -> Result<()> {
        let elem = self
            .elems
            .get_mut(index)
            .ok_or_else(|| anyhow!("No element at index {index}."))?;
        elem.set_param(name, value)?;
        self.apply_interface_links();
        Ok(())
    }

    /// Rewrites the media ports of every active interface element from
    /// its active neighbors: a range neighbor donates its index of
    /// refraction, anything else counts as air. In ring resonators the
    /// neighbors wrap around the sequence ends.
    fn apply_interface_links(&mut self) {
        let active = self.active_elements();
        let count = active.len();
        let mut updates = Vec::new();
        for (pos, &idx) in active.iter().enumerate() {
            if self.elems[idx].as_interface().is_none() {
                continue;
            }
            let left = if pos == 0 {
                match self.trip_type {
                    TripType::RR => Some(active[count - 1]),
                    _ => None,
                }
            } else {
                Some(active[pos - 1])
            };
            let right = if pos == count - 1 {
                match self.trip_type {
                    TripType::RR => Some(active[0]),
                    _ => None,
                }
            } else {
                Some(active[pos + 1])
            };
            let n1 = left
                .and_then(|i| self.elems[i].as_range())
                .map(|r| r.ior)
                .unwrap_or(1.0);
            let n2 = right
                .and_then(|i| self.elems[i].as_range())
                .map(|r| r.ior)
                .unwrap_or(1.0);
            updates.push((idx, n1, n2));
        }
        for (idx, n1, n2) in updates {
            self.elems[idx].set_interface_iors(n1, n2);
        }
    }

    // --- pumps ---

    pub fn pumps(&self) -> &[Pump] {
        &self.pumps
    }

    pub fn add_pump(&mut self, mut pump: Pump) -> usize {
        if pump.label.is_empty() {
            pump.label = self.generate_pump_label();
        }
        // the first pump starts active
        if self.pumps.is_empty() {
            pump.active = true;
        }
        self.pumps.push(pump);
        self.revision += 1;
        self.pumps.len() - 1
    }

    pub fn remove_pump(&mut self, index: usize) -> Option<Pump> {
        if index >= self.pumps.len() {
            return None;
        }
        let pump = self.pumps.remove(index);
        self.revision += 1;
        Some(pump)
    }

    /// Makes one pump active and the rest inactive.
    pub fn activate_pump(&mut self, index: usize) -> Result<()> {
        if index >= self.pumps.len() {
            bail!("No pump at index {index}.");
        }
        for (i, pump) in self.pumps.iter_mut().enumerate() {
            pump.active = i == index;
        }
        self.revision += 1;
        Ok(())
    }

    /// The first active pump; single-pass functions take their input
    /// beam from it.
    pub fn active_pump(&self) -> Option<&Pump> {
        self.pumps.iter().find(|p| p.active)
    }

    pub fn generate_pump_label(&self) -> String {
        let mut index = 1;
        loop {
            let label = format!("{}{index}", Pump::label_prefix());
            if !self.pumps.iter().any(|p| p.label == label) {
                return label;
            }
            index += 1;
        }
    }
}

/// Saved parameter value for sweep loops: take a backup, run the sweep
/// through the raw setters, put the original value back.
#[derive(Debug, Clone)]
pub struct ParamBackup {
    index: usize,
    name: String,
    value: f64,
}

impl ParamBackup {
    pub fn take(schema: &Schema, index: usize, name: &str) -> Result<Self> {
        let elem = schema
            .element(index)
            .ok_or_else(|| anyhow!("No element at index {index}."))?;
        let value = elem
            .param(name)
            .ok_or_else(|| anyhow!("Element has no parameter '{name}'."))?;
        Ok(Self {
            index,
            name: name.to_string(),
            value,
        })
    }

    pub fn restore(self, schema: &mut Schema) -> Result<()> {
        schema.set_param_raw(self.index, &self.name, self.value)
    }
}
