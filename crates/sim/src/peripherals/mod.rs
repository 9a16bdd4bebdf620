// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod afio;
pub mod exti;
pub mod flash;
pub mod gpio;
pub mod iwdg;
pub mod pfic;
pub mod pwr;
pub mod rcc;
pub mod systick;
