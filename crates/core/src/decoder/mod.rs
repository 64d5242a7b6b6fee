// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod avr;

pub use avr::decode as decode_avr;
pub use avr::Instruction as AvrInstruction;
